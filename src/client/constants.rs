//! Constants for the request pipeline (host, timeouts, platform codes).

use std::time::Duration;

/// Fixed API host for all signed calls.
pub const DEFAULT_API_HOST: &str = "https://edith.xiaohongshu.com";

/// Web origin sent in `Origin`/`Referer` headers.
pub const WEB_ORIGIN: &str = "https://www.xiaohongshu.com";

/// Default per-request timeout (60 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default attempts per logical request (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default cap on replies attached to one comment.
pub const DEFAULT_REPLY_CAP: usize = 10;

/// Default number of reply fetches in flight per comment page.
pub const DEFAULT_REPLY_FAN_OUT: usize = 3;

/// Page size the reply endpoint accepts at most.
pub const MAX_REPLY_PAGE_SIZE: usize = 10;

/// Application error code meaning the egress address is blocked.
pub const IP_BLOCKED_CODE: i64 = 300_012;

/// HTTP status the platform uses for a stale session.
pub const STATUS_SESSION_EXPIRED: u16 = 461;

/// HTTP status the platform uses for a captcha challenge.
pub const STATUS_CAPTCHA: u16 = 471;

/// Response header carrying the captcha verification type.
pub const HEADER_VERIFY_TYPE: &str = "verifytype";

/// Response header carrying the captcha challenge id.
pub const HEADER_VERIFY_UUID: &str = "verifyuuid";

/// Content type of POST bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Maximum characters of a raw body kept in error excerpts.
pub const EXCERPT_LIMIT: usize = 200;
