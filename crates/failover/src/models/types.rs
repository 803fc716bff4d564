use std::borrow::Cow;

/// Source identifier (e.g., "coingecko", "cryptopanic").
pub type SourceName = Cow<'static, str>;

/// Data domain identifier (e.g., "price", "sentiment", "news").
pub type Domain = Cow<'static, str>;
