use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pacer_core::{
    AsyncChain, Completion, ConfigError, Flow, FlowConfig, FlowError, FlowSnapshot,
    ProcessWorker, QueueStats, Settle, StepCallback, TokioScheduler, compose,
};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Deserialize)]
struct HelloPayload {
    name: String,
}

/// What each primitive produced; printed as JSON at the end.
#[derive(Debug, Serialize)]
struct Report {
    debounced: Vec<u32>,
    throttled: Vec<u32>,
    greetings: Vec<String>,
    greetings_queue: QueueStats,
    config_loads: usize,
    config: String,
    config_shared: bool,
    slow_process: String,
    gathered: Vec<u64>,
    composed: String,
    chained: u64,
    registered: FlowSnapshot,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

/// `PACER_CONFIG` names a JSON config file; defaults otherwise.
fn load_config() -> Result<FlowConfig, ConfigError> {
    match std::env::var_os("PACER_CONFIG") {
        Some(path) => {
            let config = FlowConfig::from_path(&path)?;
            tracing::info!(path = %Path::new(&path).display(), "config loaded");
            Ok(config)
        }
        None => Ok(FlowConfig::default()),
    }
}

fn record<T>(log: &Mutex<Vec<T>>, value: T) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(value);
}

fn take<T>(log: &Mutex<Vec<T>>) -> Vec<T> {
    std::mem::take(&mut *log.lock().unwrap_or_else(PoisonError::into_inner))
}

/// Settles after `delay` on the tokio timer.
fn delayed<T: Send + 'static>(delay: Duration, value: T) -> Box<dyn ProcessWorker<T>> {
    Box::new(move |settle: Settle<T>| -> Result<(), FlowError> {
        tokio::spawn(async move {
            sleep(delay).await;
            settle.ok(value);
        });
        Ok(())
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    // (A) Flow: scheduler + config + registries
    let config = load_config()?;
    let flow = Flow::with_config(Arc::new(TokioScheduler::current()), config);

    // (B) rate limiters
    let debounced = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&debounced);
    let autosave = flow.debounce_named(
        "autosave",
        Duration::from_millis(20),
        move |revision: u32| record(&sink, revision),
        false,
    )?;
    for revision in 1..=5 {
        autosave.call(revision);
        sleep(Duration::from_millis(5)).await;
    }

    let throttled = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&throttled);
    let redraw = flow.throttle_named("redraw", Duration::from_millis(20), move |frame: u32| {
        record(&sink, frame)
    })?;
    for frame in 1..=4 {
        redraw.call(frame);
    }
    sleep(Duration::from_millis(80)).await;
    redraw.call(5);
    sleep(Duration::from_millis(40)).await;

    // (C) task queue: one worker, strict FIFO, error handler keeps it going
    let greetings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&greetings);
    let queue = flow.create_queue(
        "greetings",
        move |payload: Vec<u8>, done: Completion| -> Result<(), FlowError> {
            let hello: HelloPayload = serde_json::from_slice(&payload)
                .map_err(|e| FlowError::worker(format!("json decode: {e}")))?;
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                sleep(Duration::from_millis(10)).await;
                record(&sink, format!("Hello, {}!", hello.name));
                done.done();
            });
            Ok(())
        },
    )?;
    queue.set_error_handler(|err| tracing::warn!(error = %err, "greeting rejected"));
    let drained = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&drained);
    queue.set_drain(move || flag.store(true, Ordering::SeqCst));

    for name in ["ada", "grace"] {
        queue.push(serde_json::to_vec(&serde_json::json!({ "name": name }))?);
    }
    queue.push(b"not json".to_vec());
    queue.push(serde_json::to_vec(&serde_json::json!({ "name": "flow" }))?);

    flow.wait_until(Some(Duration::from_secs(2)), move || {
        drained.load(Ordering::SeqCst)
    })
    .await?;

    // (D) processes: concurrent callers share one worker run
    let loads = Arc::new(AtomicUsize::new(0));
    let load = |loads: Arc<AtomicUsize>| {
        move |settle: Settle<String>| -> Result<(), FlowError> {
            loads.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                sleep(Duration::from_millis(30)).await;
                settle.ok("config v1".to_string());
            });
            Ok(())
        }
    };
    let first = flow.worker_with_callback_queue(
        "load-config",
        load(Arc::clone(&loads)),
        Some(Duration::from_secs(1)),
    )?;
    let second = flow.worker_with_callback_queue("load-config", load(Arc::clone(&loads)), None)?;
    let (a, b) = tokio::join!(first.wait(), second.wait());
    let loaded = a?;
    let config_shared = b.as_ref() == Ok(&loaded);

    let slow = flow.worker_with_callback_queue(
        "slow",
        |_settle: Settle<String>| -> Result<(), FlowError> { Ok(()) },
        Some(Duration::from_millis(50)),
    )?;
    let slow_process = match slow.wait().await {
        Ok(value) => value,
        Err(err) => err.to_string(),
    };

    let (tx, rx) = tokio::sync::oneshot::channel();
    flow.wait_for_all(
        Some(Duration::from_secs(1)),
        (1..=3u64).map(|n| delayed(Duration::from_millis(10 * (4 - n)), n * n)),
        move |result| {
            let _ = tx.send(result);
        },
    );
    let gathered = rx.await.unwrap_or(Err(FlowError::Canceled))?;

    // (E) composition
    let composed = compose!(
        |(a, b): (u64, u64)| a * b,
        |x: u64| x + 1,
        |x: u64| x.to_string(),
    )
    .call((11, 2));

    let chain = AsyncChain::new(
        |(a, b): (u64, u64), next: StepCallback<u64>| -> Result<(), FlowError> {
            tokio::spawn(async move {
                sleep(Duration::from_millis(5)).await;
                next.ok(a * b);
            });
            Ok(())
        },
    )
    .then(|x: u64, next: StepCallback<u64>| -> Result<(), FlowError> {
        next.ok(x + 1);
        Ok(())
    });
    let chained = chain.run((4, 5)).await?;

    let report = Report {
        debounced: take(&debounced),
        throttled: take(&throttled),
        greetings: take(&greetings),
        greetings_queue: queue.stats(),
        config_loads: loads.load(Ordering::SeqCst),
        config: loaded,
        config_shared,
        slow_process,
        gathered,
        composed,
        chained,
        registered: flow.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    // (F) dispose timers and live entries
    flow.reset();
    Ok(())
}
