use oilcast_core::progress::ProgressEvent;

/// Receiver of typed progress ticks.
///
/// Implementations must not block for long: the trainer calls `emit` from
/// inside its epoch loop.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, tick: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, tick: ProgressEvent) {
        self(tick)
    }
}
