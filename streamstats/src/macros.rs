//! Shorthands for building and returning [`crate::error::StreamStatsError`]s.

/// Creates a [`crate::error::StreamStatsError`] from a kind, a static description and
/// optionally a detail (`detail = owned_string` moves it, a bare expression is formatted with
/// `to_string`) and a `source:` error.
#[macro_export]
macro_rules! ss_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::StreamStatsError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::StreamStatsError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::StreamStatsError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr, source: $source:expr) => {
        $crate::error::StreamStatsError::from(($kind, $desc, $detail)).with_source($source)
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::StreamStatsError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::StreamStatsError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Returns early with a [`crate::error::StreamStatsError`]. Accepts the same forms as
/// [`ss_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::ss_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::ss_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::ss_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::ss_error!($kind, $desc, $detail))
    };
}
