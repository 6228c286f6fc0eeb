use super::records::non_blank;
use super::site::{Service, SiteContent};

const ROLE_PREAMBLE: &str = "You are the virtual assistant of a business website. You talk with the site's visitors on behalf of the business.";

const BEHAVIOR_RULES: &[&str] = &[
    "Always reply in the language the visitor writes in, and switch if they switch.",
    "Keep every reply short: two or three sentences at most.",
    "Disclose details progressively: answer what was asked, then offer to tell more.",
    "Do not volunteer contact details. Share the phone, email or address only when the visitor asks for them or wants to book, call or get a quote.",
    "Only talk about the services listed below and never invent prices, offers or facts.",
    "When the visitor wants to be contacted, ask for their name and email or phone number.",
];

/// Builds the system prompt for a site's assistant.
///
/// Only active services are listed and every blank field is left out, so the
/// output is a pure function of its arguments.
pub fn synthesize(content: &SiteContent, services: &[Service]) -> String {
    let mut prompt = String::with_capacity(1024);
    prompt.push_str(ROLE_PREAMBLE);
    prompt.push_str("\n\n## How to reply\n");
    for rule in BEHAVIOR_RULES {
        push_bullet(&mut prompt, rule);
    }

    let mut business = Section::new("Business");
    business.field("Name", content.hero.title.as_deref());
    business.field("Tagline", content.hero.subtitle.as_deref());
    business.field("Description", content.hero.description.as_deref());
    business.field("About", content.about.as_deref());
    business.write_to(&mut prompt);

    let mut offered = Section::new("Services");
    for service in services.iter().filter(|service| service.active) {
        let Some(title) = non_blank(Some(service.title.as_str())) else {
            continue;
        };
        let mut line = title.to_string();
        if let Some(category) = non_blank(service.category.as_deref()) {
            line.push_str(&format!(" ({category})"));
        }
        if let Some(description) = non_blank(Some(service.description.as_str())) {
            line.push_str(": ");
            line.push_str(description);
        }
        offered.bullet(line);
    }
    offered.write_to(&mut prompt);

    let contact = &content.contact;
    let mut contact_section = Section::new("Contact details (share only on request)");
    contact_section.field("Email", contact.email.as_deref());
    contact_section.field("Phone", contact.phone.as_deref());
    contact_section.field("Address", contact.address.as_deref());
    contact_section.field("Opening hours", contact.opening_hours.as_deref());
    contact_section.field("Website", contact.website.as_deref());
    contact_section.write_to(&mut prompt);

    let mut social = Section::new("Social media");
    for (platform, link) in content.social.entries() {
        social.field(platform, link);
    }
    social.write_to(&mut prompt);

    let mut figures = Section::new("Key figures");
    for statistic in &content.stats {
        if let (Some(label), Some(value)) = (
            non_blank(Some(statistic.label.as_str())),
            non_blank(Some(statistic.value.as_str())),
        ) {
            figures.bullet(format!("{label}: {value}"));
        }
    }
    figures.write_to(&mut prompt);

    let mut testimonials = Section::new("What clients say");
    for testimonial in &content.testimonials {
        let Some(quote) = non_blank(Some(testimonial.quote.as_str())) else {
            continue;
        };
        let attribution = match (
            non_blank(Some(testimonial.author.as_str())),
            non_blank(testimonial.role.as_deref()),
        ) {
            (Some(author), Some(role)) => format!(" ({author}, {role})"),
            (Some(author), None) => format!(" ({author})"),
            (None, Some(role)) => format!(" ({role})"),
            (None, None) => String::new(),
        };
        testimonials.bullet(format!("\"{quote}\"{attribution}"));
    }
    testimonials.write_to(&mut prompt);

    prompt
}

struct Section {
    title: &'static str,
    lines: Vec<String>,
}

impl Section {
    fn new(title: &'static str) -> Self {
        Self {
            title,
            lines: Vec::new(),
        }
    }

    fn field(&mut self, label: &str, value: Option<&str>) {
        if let Some(value) = non_blank(value) {
            self.lines.push(format!("{label}: {value}"));
        }
    }

    fn bullet(&mut self, line: String) {
        self.lines.push(format!("- {line}"));
    }

    fn write_to(self, prompt: &mut String) {
        if self.lines.is_empty() {
            return;
        }
        prompt.push_str("\n## ");
        prompt.push_str(self.title);
        prompt.push('\n');
        for line in self.lines {
            prompt.push_str(&line);
            prompt.push('\n');
        }
    }
}

fn push_bullet(prompt: &mut String, line: &str) {
    prompt.push_str("- ");
    prompt.push_str(line);
    prompt.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::{ContactInfo, HeroContent, Statistic, Testimonial};

    fn sample_content() -> SiteContent {
        SiteContent {
            hero: HeroContent {
                title: Some("Acme Plumbing".to_string()),
                subtitle: Some("Fast repairs, fair prices".to_string()),
                description: None,
            },
            about: Some("   ".to_string()),
            contact: ContactInfo {
                email: Some("hello@acme.test".to_string()),
                phone: Some("555-0100".to_string()),
                ..ContactInfo::default()
            },
            stats: vec![Statistic {
                label: "Years in business".to_string(),
                value: "12".to_string(),
            }],
            testimonials: vec![Testimonial {
                author: "Dana".to_string(),
                quote: "Fixed in an hour.".to_string(),
                role: None,
            }],
            ..SiteContent::default()
        }
    }

    #[test]
    fn inactive_services_never_appear() {
        let services = vec![
            Service::new("Leak repair", "Same-day fixes").with_category("Repairs"),
            Service::new("Boiler installation", "Full installs").inactive(),
        ];

        let prompt = synthesize(&sample_content(), &services);
        assert!(prompt.contains("- Leak repair (Repairs): Same-day fixes"));
        assert!(!prompt.contains("Boiler installation"));
    }

    #[test]
    fn absent_fields_are_omitted() {
        let prompt = synthesize(&sample_content(), &[]);

        assert!(prompt.contains("Name: Acme Plumbing"));
        assert!(prompt.contains("Tagline: Fast repairs, fair prices"));
        assert!(prompt.contains("Email: hello@acme.test"));
        assert!(prompt.contains("Phone: 555-0100"));
        assert!(!prompt.contains("Description:"));
        assert!(!prompt.contains("About:"));
        assert!(!prompt.contains("Address:"));
        assert!(!prompt.contains("## Services"));
        assert!(!prompt.contains("## Social media"));
        assert!(prompt.contains("- Years in business: 12"));
        assert!(prompt.contains("- \"Fixed in an hour.\" (Dana)"));
    }

    #[test]
    fn empty_context_still_carries_behavior_rules() {
        let prompt = synthesize(&SiteContent::default(), &[]);
        assert!(prompt.starts_with(ROLE_PREAMBLE));
        assert!(prompt.contains("language the visitor writes in"));
        assert!(!prompt.contains("## Business"));
    }

    #[test]
    fn identical_inputs_yield_identical_prompts() {
        let services = vec![Service::new("Leak repair", "Same-day fixes")];
        let first = synthesize(&sample_content(), &services);
        let second = synthesize(&sample_content().clone(), &services.clone());
        assert_eq!(first, second);
    }
}
