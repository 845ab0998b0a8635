pub use super::provider_access::Entity as ProviderAccess;
pub use super::user_api_keys::Entity as UserApiKeys;
pub use super::users::Entity as Users;
