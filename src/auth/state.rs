//! Authentication state trait and macro.

use crate::jwt::TokenService;

/// Trait for state types that can validate access tokens.
pub trait HasAuthBackend {
    fn tokens(&self) -> &TokenService;
}

/// Implement `HasAuthBackend` for a state struct with a
/// `tokens: Arc<TokenService>` field.
///
/// # Example
/// ```ignore
/// #[derive(Clone)]
/// pub struct MyState {
///     pub tokens: Arc<TokenService>,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn tokens(&self) -> &$crate::jwt::TokenService {
                &self.tokens
            }
        }
    };
}
