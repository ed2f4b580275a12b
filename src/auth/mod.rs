//! JWT cookie authentication.
//!
//! Dual-token system: short-lived access tokens (15 min) authorize requests
//! statelessly, long-lived refresh tokens (30 days) are only accepted by the
//! renewal endpoint. Neither is stored server side.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, CookiePolicy, REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH,
    append_set_cookies, get_cookie,
};
pub use errors::ApiAuthError;
pub use extractors::Auth;
pub use ip::{
    HasHeadersAndExtensions, SocketIp, extract_client_ip, resolve_client_ip, socket_ip,
    trusted_client_ip,
};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
