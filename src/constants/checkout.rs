//! Constants used by the checkout flow.

/// Currency every course is priced in.
pub const COURSE_CURRENCY: &str = "KES";
/// KES per USD used when the exchange-rate lookup is unavailable.
pub const FALLBACK_KES_PER_USD: f64 = 130.0;
