use sea_orm_migration::prelude::*;

mod m20250101_initial;
mod m20250102_seed_permissions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_initial::Migration),
            Box::new(m20250102_seed_permissions::Migration),
        ]
    }
}
