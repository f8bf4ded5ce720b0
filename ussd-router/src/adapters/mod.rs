//! Bundled protocol adapters.

pub mod africastalking;

pub use africastalking::AfricasTalkingAdapter;
