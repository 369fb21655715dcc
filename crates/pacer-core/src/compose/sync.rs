/// Synchronous pipeline: each function receives the previous return value.
///
/// Panics propagate to the caller; there is no error channel.
pub struct Compose<I, O> {
    func: Box<dyn Fn(I) -> O + Send + Sync>,
}

impl<I: 'static, O: 'static> Compose<I, O> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }

    /// Append `next`, fed with this pipeline's output.
    pub fn then<P, G>(self, next: G) -> Compose<I, P>
    where
        P: 'static,
        G: Fn(O) -> P + Send + Sync + 'static,
    {
        let func = self.func;
        Compose {
            func: Box::new(move |input| next(func(input))),
        }
    }

    pub fn call(&self, input: I) -> O {
        (self.func)(input)
    }
}

/// `compose!(f1, f2, ..., fn)` builds a [`Compose`] applying `f1` first.
///
/// Functions taking several arguments take them as one tuple.
#[macro_export]
macro_rules! compose {
    ($first:expr $(, $rest:expr)* $(,)?) => {
        $crate::compose::Compose::new($first)$(.then($rest))*
    };
}
