//! Platform integrations.
//!
//! Each adapter implements [`danmaku::PlatformAdapter`]: search the platform
//! for a title, fetch raw danmaku for a platform-native episode id. The Emby
//! client implements the optional metadata enrichment seam instead.

pub mod bilibili;
pub mod emby;
pub mod http;
pub mod tencent;

pub use bilibili::BilibiliAdapter;
pub use emby::EmbyEnrichment;
pub use http::{DEFAULT_UA, PlatformHttp};
pub use tencent::TencentAdapter;
