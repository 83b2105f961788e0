//! `log` on hosts, `defmt` on the boards. Format strings in this crate stick to `{}` and `{:?}` so
//! they work with either.
#[cfg(feature = "log")]
pub use log::{debug, error, info, trace, warn};

#[cfg(all(not(feature = "log"), feature = "defmt"))]
pub use defmt::{debug, error, info, trace, warn};

#[cfg(not(any(feature = "log", feature = "defmt")))]
compile_error!("if482-core needs either the `log` or the `defmt` feature");
