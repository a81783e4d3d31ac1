pub use super::action_request::Entity as ActionRequest;
pub use super::activity::Entity as Activity;
pub use super::feedback::Entity as Feedback;
pub use super::message::Entity as Message;
pub use super::sea_orm_active_enums::*;
pub use super::user::Entity as User;
pub use super::user_account_access::Entity as UserAccountAccess;
pub use super::user_profile::Entity as UserProfile;
pub use super::user_task::Entity as UserTask;
