use std::sync::Arc;

use sitechat_storage::{DurableStore, SiteId};
use snafu::{OptionExt, ensure};

use super::error::{ConflictSnafu, CoreResult, NotFoundSnafu, recover};
use super::events::{EventBroadcaster, Topic};
use super::paths::allocate_url_path;
use super::records::{
    ACTIVE_SITE_NAMESPACE, SITES_NAMESPACE, load_namespace, load_namespace_checked,
    now_unix_millis, save_namespace,
};
use super::site::{NewSite, Site, SitePatch};

/// Persisted pointer to the site presented by default.
///
/// The pointer is stored apart from the site records and may name a site that
/// no longer exists; [`SiteRegistry::get_active`] repairs it on read.
#[derive(Clone)]
pub struct ActiveSelection {
    store: Arc<dyn DurableStore>,
}

impl ActiveSelection {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    pub fn get(&self) -> Option<SiteId> {
        load_namespace::<SiteId>(self.store.as_ref(), ACTIVE_SITE_NAMESPACE)
            .into_iter()
            .next()
    }

    pub(crate) fn get_checked(&self) -> CoreResult<Option<SiteId>> {
        Ok(
            load_namespace_checked::<SiteId>(self.store.as_ref(), ACTIVE_SITE_NAMESPACE)?
                .into_iter()
                .next(),
        )
    }

    pub fn set(&self, site_id: SiteId) -> CoreResult<()> {
        save_namespace(self.store.as_ref(), ACTIVE_SITE_NAMESPACE, &[site_id])
    }
}

/// Collection of sites with a single active selection.
#[derive(Clone)]
pub struct SiteRegistry {
    store: Arc<dyn DurableStore>,
    selection: ActiveSelection,
    events: EventBroadcaster,
}

impl SiteRegistry {
    pub fn new(store: Arc<dyn DurableStore>, events: EventBroadcaster) -> Self {
        Self {
            selection: ActiveSelection::new(Arc::clone(&store)),
            store,
            events,
        }
    }

    pub fn selection(&self) -> &ActiveSelection {
        &self.selection
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// All sites in insertion order.
    pub fn list(&self) -> Vec<Site> {
        load_namespace(self.store.as_ref(), SITES_NAMESPACE)
    }

    pub fn get(&self, site_id: SiteId) -> Option<Site> {
        self.list().into_iter().find(|site| site.id == site_id)
    }

    fn load_sites(&self) -> CoreResult<Vec<Site>> {
        load_namespace_checked(self.store.as_ref(), SITES_NAMESPACE)
    }

    pub fn get_by_path(&self, url_path: &str) -> Option<Site> {
        self.list()
            .into_iter()
            .find(|site| site.url_path == url_path)
    }

    /// Inserts a new site with a fresh id and path and makes it active.
    pub fn create(&self, input: NewSite) -> CoreResult<Site> {
        let mut sites = self.load_sites()?;

        let mut site_id = SiteId::new_v7();
        while sites.iter().any(|site| site.id == site_id) {
            site_id = SiteId::new_v7();
        }
        let url_path = allocate_url_path(&input.name, sites.iter().map(|site| site.url_path.as_str()));
        let now = now_unix_millis();

        let site = Site {
            id: site_id,
            name: input.name,
            url_path,
            content: input.content.unwrap_or_default(),
            services: input.services.unwrap_or_default(),
            portfolio: input.portfolio.unwrap_or_default(),
            design: input.design.unwrap_or_default(),
            created_at_unix_millis: now,
            updated_at_unix_millis: now,
        };

        sites.push(site.clone());
        save_namespace(self.store.as_ref(), SITES_NAMESPACE, &sites)?;
        self.selection.set(site.id)?;

        tracing::info!(
            site_id = %site.id,
            url_path = %site.url_path,
            site_count = sites.len(),
            "created site"
        );
        self.events.publish(Topic::SiteRegistryChanged);
        self.events.publish(Topic::ActiveSiteChanged);
        Ok(site)
    }

    /// Shallow-merges `patch` into a site. Returns `false` for an unknown id.
    pub fn update(&self, site_id: SiteId, patch: SitePatch) -> CoreResult<bool> {
        recover(self.update_checked(site_id, patch).map(|_| true), false)
    }

    pub fn update_checked(&self, site_id: SiteId, patch: SitePatch) -> CoreResult<Site> {
        let mut sites = self.load_sites()?;
        let site = sites
            .iter_mut()
            .find(|site| site.id == site_id)
            .context(NotFoundSnafu {
                stage: "site-update-find",
                entity: "site",
                id: site_id.to_string(),
            })?;

        patch.apply_to(site);
        site.updated_at_unix_millis = now_unix_millis().max(site.updated_at_unix_millis);
        let updated = site.clone();

        save_namespace(self.store.as_ref(), SITES_NAMESPACE, &sites)?;
        tracing::debug!(site_id = %site_id, "updated site");
        self.events.publish(Topic::SiteRegistryChanged);
        Ok(updated)
    }

    /// Removes a site unless it is the last one. Returns `false` when refused.
    pub fn delete(&self, site_id: SiteId) -> CoreResult<bool> {
        recover(self.delete_checked(site_id).map(|()| true), false)
    }

    pub fn delete_checked(&self, site_id: SiteId) -> CoreResult<()> {
        let mut sites = self.load_sites()?;
        let index = sites
            .iter()
            .position(|site| site.id == site_id)
            .context(NotFoundSnafu {
                stage: "site-delete-find",
                entity: "site",
                id: site_id.to_string(),
            })?;
        ensure!(
            sites.len() > 1,
            ConflictSnafu {
                stage: "site-delete-last",
                entity: "site",
                details: format!("site '{site_id}' is the last remaining site"),
            }
        );

        sites.remove(index);
        save_namespace(self.store.as_ref(), SITES_NAMESPACE, &sites)?;

        let mut repointed = false;
        if self.selection.get_checked()? == Some(site_id)
            && let Some(first) = sites.first()
        {
            self.selection.set(first.id)?;
            repointed = true;
        }

        tracing::info!(
            site_id = %site_id,
            active_repointed = repointed,
            site_count = sites.len(),
            "deleted site"
        );
        self.events.publish(Topic::SiteRegistryChanged);
        if repointed {
            self.events.publish(Topic::ActiveSiteChanged);
        }
        Ok(())
    }

    /// The active site, repairing a stale or missing pointer on the way.
    ///
    /// Returns `None` only when the registry is empty.
    /// Returns `None` without repairing anything when the store cannot be read.
    pub fn get_active(&self) -> Option<Site> {
        let sites = match self.load_sites() {
            Ok(sites) => sites,
            Err(error) => {
                tracing::warn!(error = %error, "cannot resolve the active site");
                return None;
            }
        };
        let pointer = match self.selection.get_checked() {
            Ok(pointer) => pointer,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "active site pointer is unreadable; serving the first site without repair"
                );
                return sites.into_iter().next();
            }
        };

        if let Some(active_id) = pointer
            && let Some(site) = sites.iter().find(|site| site.id == active_id)
        {
            return Some(site.clone());
        }

        let first = sites.into_iter().next()?;
        tracing::warn!(
            stale_pointer = ?pointer.map(|id| id.to_string()),
            site_id = %first.id,
            "active site pointer is missing or stale; falling back to the first site"
        );
        match self.selection.set(first.id) {
            Ok(()) => self.events.publish(Topic::ActiveSiteChanged),
            Err(error) => tracing::warn!(
                site_id = %first.id,
                error = %error,
                "failed to persist repaired active site pointer"
            ),
        }
        Some(first)
    }

    /// Points the active selection at `site_id` without checking that it exists.
    ///
    /// Callers validate the id; an unknown id is repaired by the next
    /// [`SiteRegistry::get_active`].
    pub fn set_active(&self, site_id: SiteId) -> CoreResult<()> {
        self.selection.set(site_id)?;
        tracing::debug!(site_id = %site_id, "set active site");
        self.events.publish(Topic::ActiveSiteChanged);
        Ok(())
    }
}
