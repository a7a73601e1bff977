use async_trait::async_trait;

use crate::{
    application::repos::{RepoError, SiteRegistry},
    domain::entities::SiteRecord,
};

use super::{PostgresRepositories, util::map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SiteRow {
    domain: String,
    path: String,
    public: bool,
    archived: bool,
    spam: bool,
    deleted: bool,
}

impl From<SiteRow> for SiteRecord {
    fn from(row: SiteRow) -> Self {
        Self {
            domain: row.domain,
            path: row.path,
            public: row.public,
            archived: row.archived,
            spam: row.spam,
            deleted: row.deleted,
        }
    }
}

#[async_trait]
impl SiteRegistry for PostgresRepositories {
    async fn list_sites(&self) -> Result<Vec<SiteRecord>, RepoError> {
        let rows: Vec<SiteRow> = sqlx::query_as(
            r#"
            SELECT domain, path, public, archived, spam, deleted
            FROM sites
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SiteRecord::from).collect())
    }
}
