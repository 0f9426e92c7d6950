//! Built-in logger.
//!
//! Uses the `env_logger` crate, enabled by the Cargo feature `builtin_env_logger` (on by
//! default). Initialized from [`crate::runtime::RuntimeBuilder::build`]. Embedders that
//! already run their own `log` backend should disable the feature and install their own
//! subscriber before constructing a [`crate::runtime::Runtime`].

/// Attempt to init an env_logger for rtgc. Does nothing if `builtin_env_logger` is disabled.
pub(crate) fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            );

            match result {
                Ok(()) => {
                    log::debug!("rtgc initialized the logger.");
                }
                Err(e) => {
                    // Only raised when a logger is already installed.
                    log::debug!("rtgc failed to initialize the built-in env_logger: {e}");
                }
            }
        } else {
            log::debug!("rtgc didn't initialize the built-in env_logger; the \"builtin_env_logger\" feature is disabled.");
        }
    }
}
