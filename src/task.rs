/// A type-erased unit of work that can be invoked exactly once.
///
/// The queue and the workers only ever see `Box<dyn Invoke>`; each concrete
/// task type owns whatever state it needs to run.
pub trait Invoke: Send + 'static {
    /// Runs the task, consuming it.
    fn call(self: Box<Self>);
}

impl<F> Invoke for F
where
    F: FnOnce() + Send + 'static,
{
    fn call(self: Box<Self>) {
        (*self)()
    }
}

/// A queued unit of work.
pub type Task = Box<dyn Invoke>;
