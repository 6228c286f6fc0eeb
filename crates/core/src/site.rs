use serde::{Deserialize, Serialize};
use sitechat_storage::SiteId;

/// One tenant's published content bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub url_path: String,
    #[serde(default)]
    pub content: SiteContent,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub portfolio: Vec<PortfolioItem>,
    #[serde(default)]
    pub design: SiteDesign,
    pub created_at_unix_millis: u64,
    pub updated_at_unix_millis: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContent {
    #[serde(default)]
    pub hero: HeroContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub social: SocialLinks,
    #[serde(default)]
    pub stats: Vec<Statistic>,
    #[serde(default)]
    pub testimonials: Vec<Testimonial>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeroContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiktok: Option<String>,
}

impl SocialLinks {
    /// Platform label and link pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 6] {
        [
            ("Facebook", self.facebook.as_deref()),
            ("Instagram", self.instagram.as_deref()),
            ("LinkedIn", self.linkedin.as_deref()),
            ("X / Twitter", self.twitter.as_deref()),
            ("YouTube", self.youtube.as_deref()),
            ("TikTok", self.tiktok.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistic {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub author: String,
    pub quote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    // Only an explicit `true` publishes a service.
    #[serde(default)]
    pub active: bool,
}

impl Service {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: None,
            active: true,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PortfolioKind {
    Image,
    Video,
    CaseStudy,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioItem {
    pub kind: PortfolioKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDesign {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_layout_variant: Option<String>,
}

/// Input for [`crate::SiteRegistry::create`]; omitted sections start empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewSite {
    pub name: String,
    pub content: Option<SiteContent>,
    pub services: Option<Vec<Service>>,
    pub portfolio: Option<Vec<PortfolioItem>>,
    pub design: Option<SiteDesign>,
}

impl NewSite {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: SiteContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_services(mut self, services: Vec<Service>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn with_design(mut self, design: SiteDesign) -> Self {
        self.design = Some(design);
        self
    }
}

/// Top-level partial update. Supplied sections replace the stored ones wholesale.
///
/// `id` and `url_path` are not patchable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SitePatch {
    pub name: Option<String>,
    pub content: Option<SiteContent>,
    pub services: Option<Vec<Service>>,
    pub portfolio: Option<Vec<PortfolioItem>>,
    pub design: Option<SiteDesign>,
}

impl SitePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.content.is_none()
            && self.services.is_none()
            && self.portfolio.is_none()
            && self.design.is_none()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn content(mut self, content: SiteContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn services(mut self, services: Vec<Service>) -> Self {
        self.services = Some(services);
        self
    }

    pub fn portfolio(mut self, portfolio: Vec<PortfolioItem>) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    pub fn design(mut self, design: SiteDesign) -> Self {
        self.design = Some(design);
        self
    }

    pub(crate) fn apply_to(self, site: &mut Site) {
        if let Some(name) = self.name {
            site.name = name;
        }
        if let Some(content) = self.content {
            site.content = content;
        }
        if let Some(services) = self.services {
            site.services = services;
        }
        if let Some(portfolio) = self.portfolio {
            site.portfolio = portfolio;
        }
        if let Some(design) = self.design {
            site.design = design;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sparse_stored_site_decodes_with_empty_sections() {
        let id = SiteId::new_v7();
        let site: Site = serde_json::from_value(json!({
            "id": id.to_string(),
            "name": "Acme",
            "urlPath": "/acme",
            "createdAtUnixMillis": 1,
            "updatedAtUnixMillis": 2,
        }))
        .expect("sparse site decodes");

        assert_eq!(site.content, SiteContent::default());
        assert!(site.services.is_empty());
        assert!(site.portfolio.is_empty());
        assert_eq!(site.design, SiteDesign::default());
    }

    #[test]
    fn service_without_active_flag_is_inactive() {
        let service: Service =
            serde_json::from_value(json!({ "title": "Repair" })).expect("service decodes");
        assert!(!service.active);
        assert!(Service::new("Repair", "").active);
    }
}
