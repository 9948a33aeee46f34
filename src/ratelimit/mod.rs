//! Rate limiting primitives.

mod bucket;
mod window;

pub use bucket::LeakyBucket;
pub use window::WindowedLimiter;
