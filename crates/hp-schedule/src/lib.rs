//! Self-tuning polling timer.
//!
//! [`AdaptiveScheduler`] repeatedly samples a [`Probe`] and shortens its delay
//! while a large share of recent samples report changes. Time comes from an
//! injected [`Clock`] so the timer can run against virtual time.

pub mod clock;
pub mod frame_fit;
mod scheduler;
pub mod window;

pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use frame_fit::FrameFitter;
pub use frame_fit::FrameSurface;
pub use frame_fit::Size;
pub use scheduler::AdaptiveScheduler;
pub use scheduler::FallibleProbe;
pub use scheduler::MIN_TIMER_DELAY_MS;
pub use scheduler::Probe;
pub use scheduler::SchedulerConfig;
pub use scheduler::SchedulerState;
pub use window::Sample;
pub use window::WindowCount;
