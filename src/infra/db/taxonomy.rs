use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, TaxonomyRepo},
    domain::{entities::TaxonomyTerm, types::Taxonomy},
};

use super::{PostgresRepositories, util::map_sqlx_error};

#[derive(sqlx::FromRow)]
struct TermRow {
    id: Uuid,
    slug: String,
    link: String,
}

#[async_trait]
impl TaxonomyRepo for PostgresRepositories {
    async fn list_terms(&self, taxonomy: Taxonomy) -> Result<Vec<TaxonomyTerm>, RepoError> {
        let rows: Vec<TermRow> = sqlx::query_as(
            r#"
            SELECT id, slug, link
            FROM taxonomy_terms
            WHERE taxonomy = $1
            ORDER BY slug, id
            "#,
        )
        .bind(taxonomy.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| TaxonomyTerm {
                id: row.id,
                taxonomy,
                slug: row.slug,
                link: row.link,
            })
            .collect())
    }
}
