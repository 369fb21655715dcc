use std::sync::Arc;

type Original<A, R> = Arc<dyn Fn(A) -> R + Send + Sync>;
type Around<A, R> = Arc<dyn Fn(&dyn Fn(A) -> R, A) -> R + Send + Sync>;

/// A function decorated by an `around` function that decides how to call it.
pub struct Wrapped<A, R> {
    original: Original<A, R>,
    around: Around<A, R>,
}

impl<A, R> Clone for Wrapped<A, R> {
    fn clone(&self) -> Self {
        Self {
            original: Arc::clone(&self.original),
            around: Arc::clone(&self.around),
        }
    }
}

impl<A, R> Wrapped<A, R> {
    pub fn call(&self, args: A) -> R {
        (self.around)(&*self.original, args)
    }

    /// The undecorated function.
    pub fn original(&self) -> &(dyn Fn(A) -> R + Send + Sync) {
        &*self.original
    }
}

/// Wrap `original`; `around(proceed, args)` receives the original as `proceed`.
pub fn wrap<A, R, F, W>(original: F, around: W) -> Wrapped<A, R>
where
    F: Fn(A) -> R + Send + Sync + 'static,
    W: Fn(&dyn Fn(A) -> R, A) -> R + Send + Sync + 'static,
{
    Wrapped {
        original: Arc::new(original),
        around: Arc::new(around),
    }
}

/// Bind the first argument of a binary function.
pub fn curry<A, B, R, F>(func: F, first: A) -> impl Fn(B) -> R
where
    A: Clone,
    F: Fn(A, B) -> R,
{
    move |second| func(first.clone(), second)
}

/// Swap the first two arguments of a three-argument function.
pub fn flip<A, B, C, R, F>(func: F) -> impl Fn(B, A, C) -> R
where
    F: Fn(A, B, C) -> R,
{
    move |b, a, c| func(a, b, c)
}
