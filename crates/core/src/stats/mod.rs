//! Online statistics over sliding windows.
//!
//! A [`SlidingWindow`] stores timestamped items in FIFO order and evicts them
//! by count and/or age. Statistics are attached as [`WindowPlugin`]s and are
//! updated incrementally on every insertion and eviction, so a window of any
//! size costs `O(log n)` (order statistics) or `O(1)` (moments) per item.
//!
//! ## Plugins
//!
//! | Plugin | Result | Notes |
//! |--------|--------|-------|
//! | [`Sum`], [`Average`] | `f64` | non-finite values skipped |
//! | [`StdDev`] | `f64` | unbounded (damped) or windowed |
//! | [`MinMax`] | [`MinMaxStats`] | ordered multiset |
//! | [`Percentile`] | [`PercentileStats`] | dual order-statistics trees |
//! | [`LinearPercentile`] | `Option<N>` | sort-based reference |
//! | [`Correlation`] | `f64` | lagged through two delay windows |
//! | [`Histogram`] | `&[u64]` | plus bucket percentile trackers |
//! | [`Bucketizer`] | `&[i64]` | threshold-split sums |
//! | [`Int32Stats`] | [`Int32Summary`] | exact integer moments |
//!
//! Results are delivered synchronously to listeners; [`LatestValue`] is a
//! ready-made listener target for reading a result back.

mod buckets;
mod correlation;
mod histogram;
mod int32;
mod linear_percentile;
mod minmax;
mod percentile;
mod plugin;
mod stddev;
mod sum;
mod window;


pub use buckets::{BucketListener, Bucketizer};
pub use correlation::Correlation;
pub use histogram::{Histogram, HistogramListener};
pub use int32::{Int32Stats, Int32Summary};
pub use linear_percentile::LinearPercentile;
pub use minmax::{MinMax, MinMaxStats};
pub use percentile::{Percentile, PercentileStats, PercentileValue, MAX_PERCENTILE, MIN_PERCENTILE};
pub use plugin::{Extractor, ItemFilter, LatestValue, Listener, WindowPlugin};
pub use stddev::StdDev;
pub use sum::{Average, Sum};
pub use window::SlidingWindow;
