pub use sea_orm_migration::prelude::*;

mod m20250210_000001_create_users_table;
mod m20250210_000002_create_messages_table;
mod m20250210_000003_create_feedback_table;
mod m20250210_000004_create_action_requests_table;
mod m20250210_000005_create_user_profiles_table;
mod m20250210_000006_create_activities_table;
mod m20250210_000007_create_user_tasks_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250210_000001_create_users_table::Migration),
            Box::new(m20250210_000002_create_messages_table::Migration),
            Box::new(m20250210_000003_create_feedback_table::Migration),
            Box::new(m20250210_000004_create_action_requests_table::Migration),
            Box::new(m20250210_000005_create_user_profiles_table::Migration),
            Box::new(m20250210_000006_create_activities_table::Migration),
            Box::new(m20250210_000007_create_user_tasks_table::Migration),
        ]
    }
}
