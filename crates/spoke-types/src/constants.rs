//! System-wide constants for the Spoke consistency core.

/// Decimal places of both wei and the hub's token.
pub const TOKEN_DECIMALS: u32 = 18;

/// Minimum custodial withdrawal: 0.1 token in base units.
pub const DEFAULT_MIN_WITHDRAWAL_TOKEN: u128 = 100_000_000_000_000_000;

/// Exchange rates older than this are refused during settlement.
pub const DEFAULT_MAX_RATE_AGE_SECS: u64 = 600;

/// Number of recorded withdrawal request ids remembered for idempotency.
pub const DEFAULT_IDEMPOTENCY_CACHE_SIZE: usize = 100_000;

/// Lifetime of a hub auth token before it must be refreshed.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

/// Refresh a session this long before it actually expires.
pub const SESSION_REFRESH_MARGIN_SECS: i64 = 60;

/// `meta.reason` attached to custodial withdrawal transfers.
pub const CUSTODIAL_WITHDRAWAL_REASON: &str = "custodial withdrawal";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
