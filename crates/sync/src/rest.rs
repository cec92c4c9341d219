// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST collaborator used to seed and refetch cached queries.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use serde::Deserialize;

use crate::auth::AuthProvider;
use crate::cache::merge::{record_key, ListPage};
use crate::cache::{CachedData, EntityKind, QueryKey, Scope};
use crate::event::{EntityKey, Record};

/// One page of a list endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: Option<u64>,
}

/// List endpoints answer either with a bare array or with a wrapper object.
#[derive(Deserialize)]
#[serde(untagged)]
enum PageBody {
    Wrapped {
        #[serde(alias = "items", alias = "results")]
        data: Vec<Record>,
        #[serde(default)]
        total: Option<u64>,
    },
    Bare(Vec<Record>),
}

impl From<PageBody> for Page {
    fn from(body: PageBody) -> Self {
        match body {
            PageBody::Wrapped { data, total } => Self { items: data, total },
            PageBody::Bare(items) => Self { items, total: None },
        }
    }
}

/// Authoritative record source. Every cache entry is seeded from here; events
/// only ever patch what this returned.
pub trait RestSource: Send + Sync {
    fn list(&self, kind: EntityKind, page: Option<u32>) -> BoxFuture<'_, anyhow::Result<Page>>;
    fn get(&self, kind: EntityKind, id: EntityKey) -> BoxFuture<'_, anyhow::Result<Record>>;
    fn series(&self, channel: EntityKey) -> BoxFuture<'_, anyhow::Result<Vec<Record>>>;
    fn alerts(&self) -> BoxFuture<'_, anyhow::Result<Vec<Record>>>;
    fn dashboard(&self) -> BoxFuture<'_, anyhow::Result<Vec<Record>>>;
}

/// Fetch the authoritative data for `key` and shape it for the cache.
pub async fn fetch_query(rest: &dyn RestSource, key: &QueryKey) -> anyhow::Result<CachedData> {
    let key_field = key.kind.key_field();
    let data = match (key.kind, &key.scope) {
        (EntityKind::Bandwidth, Scope::Series(channel)) => {
            let mut samples = rest.series(channel.clone()).await?;
            samples.sort_by_key(|r| record_key(r, key_field));
            CachedData::Series(samples)
        }
        (EntityKind::Bandwidth, _) => anyhow::bail!("bandwidth queries are scoped to a channel"),
        (EntityKind::Alert, _) => CachedData::Feed(rest.alerts().await?),
        (EntityKind::Dashboard, _) => {
            CachedData::List(ListPage::from_records(rest.dashboard().await?, key_field))
        }
        (kind, Scope::All) => {
            let page = rest.list(kind, None).await?;
            let mut list = ListPage::from_records(page.items, key_field);
            list.total = page.total;
            CachedData::List(list)
        }
        (kind, Scope::Page(n)) => {
            let page = rest.list(kind, Some(*n)).await?;
            let mut list = ListPage::from_records(page.items, key_field);
            list.page = Some(*n);
            list.total = page.total;
            CachedData::List(list)
        }
        (kind, Scope::Id(id)) => CachedData::Scalar(rest.get(kind, id.clone()).await?),
        (kind, Scope::Series(_)) => anyhow::bail!("{kind} has no series queries"),
    };
    Ok(data)
}

// -- HTTP implementation -----------------------------------------------------

/// REST client for the dashboard backend.
pub struct HttpRestSource {
    base_url: String,
    auth: Arc<dyn AuthProvider>,
    client: Client,
}

impl HttpRestSource {
    pub fn new(
        base_url: &str,
        auth: Arc<dyn AuthProvider>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        crate::ensure_crypto();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_owned(), auth, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.bearer_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let req = self.client.get(self.url(path));
        let resp = self.apply_auth(req).send().await?;
        let value = resp.error_for_status()?.json().await?;
        Ok(value)
    }
}

/// Collection path for entity kinds that have one.
pub fn resource_path(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Channel => Some("/api/channels"),
        EntityKind::Artery => Some("/api/arteries"),
        EntityKind::Source => Some("/api/sources"),
        EntityKind::Destination => Some("/api/destinations"),
        EntityKind::Dashboard | EntityKind::Bandwidth | EntityKind::Alert => None,
    }
}

impl RestSource for HttpRestSource {
    fn list(&self, kind: EntityKind, page: Option<u32>) -> BoxFuture<'_, anyhow::Result<Page>> {
        async move {
            let base = resource_path(kind).ok_or_else(|| anyhow::anyhow!("{kind} is not listable"))?;
            let path = match page {
                Some(n) => format!("{base}?page={n}"),
                None => base.to_owned(),
            };
            let body: PageBody = self.get_json(&path).await?;
            Ok(body.into())
        }
        .boxed()
    }

    fn get(&self, kind: EntityKind, id: EntityKey) -> BoxFuture<'_, anyhow::Result<Record>> {
        async move {
            let base = resource_path(kind).ok_or_else(|| anyhow::anyhow!("{kind} has no detail"))?;
            self.get_json(&format!("{base}/{id}")).await
        }
        .boxed()
    }

    fn series(&self, channel: EntityKey) -> BoxFuture<'_, anyhow::Result<Vec<Record>>> {
        async move { self.get_json(&format!("/api/channels/{channel}/bandwidth")).await }.boxed()
    }

    fn alerts(&self) -> BoxFuture<'_, anyhow::Result<Vec<Record>>> {
        async move {
            let body: PageBody = self.get_json("/api/alerts").await?;
            Ok(Page::from(body).items)
        }
        .boxed()
    }

    fn dashboard(&self) -> BoxFuture<'_, anyhow::Result<Vec<Record>>> {
        async move {
            let body: PageBody = self.get_json("/api/dashboard").await?;
            Ok(Page::from(body).items)
        }
        .boxed()
    }
}

#[cfg(test)]
#[path = "rest_tests.rs"]
mod tests;
