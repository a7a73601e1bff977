use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ContentPage, ContentRepo, FetchScope, RepoError},
    domain::{
        entities::{ContentItem, ItemImage},
        types::ContentKind,
    },
};

use super::{
    PostgresRepositories,
    util::{convert_count, map_sqlx_error},
};

/// Published items of public kinds, custom kinds included.
const ELIGIBLE_FROM: &str = " FROM content_items c \
    INNER JOIN content_kinds k ON k.name = c.kind \
    LEFT JOIN content_images i ON i.item_id = c.id \
    WHERE c.status = 'published' AND c.published_at IS NOT NULL AND k.public ";

const SITEMAP_ORDER: &str = " ORDER BY c.modified_at DESC, c.id DESC ";

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: Uuid,
    kind: String,
    permalink: String,
    title: String,
    published_at: OffsetDateTime,
    modified_at: OffsetDateTime,
    image_url: Option<String>,
    image_title: Option<String>,
    image_caption: Option<String>,
    total_count: i64,
}

impl From<ContentRow> for ContentItem {
    fn from(row: ContentRow) -> Self {
        let image = row.image_url.map(|url| ItemImage {
            url,
            title: row.image_title.unwrap_or_default(),
            caption: row.image_caption.unwrap_or_default(),
        });
        Self {
            id: row.id,
            kind: ContentKind::from(row.kind.as_str()),
            permalink: row.permalink,
            title: row.title,
            published_at: row.published_at,
            modified_at: row.modified_at,
            image,
        }
    }
}

impl PostgresRepositories {
    async fn count_eligible(&self) -> Result<u64, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT COUNT(*)");
        qb.push(ELIGIBLE_FROM);
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn fetch_window(
        &self,
        since: Option<OffsetDateTime>,
        offset: u64,
        limit: u64,
    ) -> Result<ContentPage, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT c.id, c.kind, c.permalink, c.title, c.published_at, c.modified_at, \
             i.url AS image_url, i.title AS image_title, i.caption AS image_caption, \
             COUNT(*) OVER () AS total_count",
        );
        qb.push(ELIGIBLE_FROM);
        if let Some(since) = since {
            qb.push(" AND c.modified_at >= ");
            qb.push_bind(since);
        }
        qb.push(SITEMAP_ORDER);
        qb.push(" LIMIT ");
        qb.push_bind(to_i64(limit)?);
        qb.push(" OFFSET ");
        qb.push_bind(to_i64(offset)?);

        let rows: Vec<ContentRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let total_count = match rows.first() {
            Some(row) => convert_count(row.total_count)?,
            None if offset > 0 && since.is_none() => self.count_eligible().await?,
            None => 0,
        };

        Ok(ContentPage {
            items: rows.into_iter().map(ContentItem::from).collect(),
            total_count,
        })
    }
}

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn fetch(&self, scope: FetchScope) -> Result<ContentPage, RepoError> {
        match scope {
            FetchScope::CountOnly => Ok(ContentPage {
                items: Vec::new(),
                total_count: self.count_eligible().await?,
            }),
            FetchScope::RecentWindow { since, limit } => {
                self.fetch_window(Some(since), 0, u64::from(limit)).await
            }
            FetchScope::Page { .. } | FetchScope::All { .. } => {
                let (offset, limit) = scope.window().unwrap_or((0, 0));
                self.fetch_window(None, offset, limit).await
            }
        }
    }

    async fn latest_modified(&self) -> Result<Option<OffsetDateTime>, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT MAX(c.modified_at)");
        qb.push(ELIGIBLE_FROM);
        qb.build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}

fn to_i64(value: u64) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::from_persistence("window exceeds supported range"))
}
