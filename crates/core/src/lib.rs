//! Multi-site state and visitor chat pipeline.
//!
//! Sites and conversations live in a [`sitechat_storage::DurableStore`]; every
//! mutation is written before the matching [`Topic`] is published.

pub mod classifier;
pub mod conversation;
pub mod error;
pub mod events;
pub mod paths;
pub mod prompt;
pub mod records;
pub mod registry;
pub mod sessions;
pub mod site;
#[cfg(test)]
mod test_support;
pub mod visitor;

pub use classifier::{MARKER_RULES, MarkerRule, classify, classify_text};
pub use conversation::{ChatMessage, Conversation, MessageRole, Stage, VisitorInfo};
pub use error::{CoreError, CoreResult};
pub use events::{EventBroadcaster, Subscription, Topic};
pub use paths::{RESERVED_PATHS, allocate_url_path, is_reserved_path, slugify};
pub use prompt::synthesize;
pub use records::{ACTIVE_SITE_NAMESPACE, CONVERSATIONS_NAMESPACE, SITES_NAMESPACE};
pub use registry::{ActiveSelection, SiteRegistry};
pub use sessions::ChatSessionStore;
pub use site::{
    ContactInfo, HeroContent, NewSite, PortfolioItem, PortfolioKind, Service, Site, SiteContent,
    SiteDesign, SitePatch, SocialLinks, Statistic, Testimonial,
};
pub use visitor::extract_visitor_info;
