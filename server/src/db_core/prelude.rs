pub use entity::prelude::*;
pub use entity::{
    action_request, activity, feedback, message, sea_orm_active_enums::*, user,
    user_account_access, user_profile, user_task,
};
pub use sea_orm::{
    entity::*, prelude::Expr, query::*, sea_query::OnConflict, ActiveValue, Condition,
    DatabaseConnection, DbErr, EntityTrait, FromQueryResult, JoinType, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, QueryTrait, RuntimeErr,
};
