//! Contact details, company facts and the service catalogue.

use concierge_core::config::SupportConfig;
use concierge_core::models::ContactEntry;
use concierge_core::ContactSource;

use super::intent::InfoTopic;

/// Contacts from the live source, or `fallback` when the source fails or is empty.
///
/// The flag is `true` when the fallback was served.
pub async fn contact_entries(
    source: &dyn ContactSource,
    fallback: &[ContactEntry],
    timeout_seconds: u64,
) -> (Vec<ContactEntry>, bool) {
    let fetched = tokio::time::timeout(
        std::time::Duration::from_secs(timeout_seconds),
        source.fetch(),
    )
    .await;

    match fetched {
        Ok(Ok(entries)) if !entries.is_empty() => (entries, false),
        Ok(Ok(_)) => {
            tracing::warn!(source = source.name(), "Contact source returned no rows; using fallback");
            (fallback.to_vec(), true)
        }
        Ok(Err(e)) => {
            tracing::warn!(source = source.name(), error = %e, "Contact source failed; using fallback");
            (fallback.to_vec(), true)
        }
        Err(_) => {
            tracing::warn!(source = source.name(), timeout_seconds, "Contact source timed out; using fallback");
            (fallback.to_vec(), true)
        }
    }
}

const PLATFORMS: &[(&str, &[&str])] = &[
    ("facebook", &["facebook", "fb"]),
    ("linkedin", &["linkedin"]),
    ("instagram", &["instagram", "insta"]),
    ("x", &["twitter", "x profile", "x account"]),
];

/// Narrow to the social profile the user asked about, if any and if present.
pub fn select_for_message(message: &str, entries: Vec<ContactEntry>) -> Vec<ContactEntry> {
    let text = message.to_lowercase();
    let words: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let wanted = PLATFORMS.iter().find(|(_, aliases)| {
        aliases.iter().any(|alias| {
            if alias.contains(' ') {
                text.contains(alias)
            } else {
                words.contains(alias)
            }
        })
    });

    let Some((platform, aliases)) = wanted else {
        return entries;
    };

    let matching: Vec<ContactEntry> = entries
        .iter()
        .filter(|e| {
            let label = e.label.to_lowercase();
            label.split_whitespace().next() == Some(platform)
                || aliases.iter().any(|a| label.contains(a))
        })
        .cloned()
        .collect();

    if matching.is_empty() {
        entries
    } else {
        matching
    }
}

pub fn format_contacts(entries: &[ContactEntry], support_phone: &str) -> String {
    if entries.is_empty() {
        return format!("You can reach our support team at {}.", support_phone);
    }
    let lines: Vec<String> = entries
        .iter()
        .map(|e| format!("{}: {}", e.label, e.value))
        .collect();
    format!("Here's how you can reach us:\n\n{}", lines.join("\n"))
}

pub fn format_services(services: &[String], company_name: &str) -> String {
    let bullets: Vec<String> = services.iter().map(|s| format!("• {}", s)).collect();
    format!(
        "{} offers the following services:\n\n{}\n\nWould you like to book one of these services? Just say \"book a service\".",
        company_name,
        bullets.join("\n")
    )
}

fn identity(support: &SupportConfig) -> String {
    if support.assistant_name.is_empty() {
        format!("I'm the virtual assistant for {}.", support.company_name)
    } else {
        format!(
            "I'm {}, the official assistant for {}.",
            support.assistant_name, support.company_name
        )
    }
}

pub fn greeting(support: &SupportConfig, service_count: usize) -> String {
    let mut text = format!("Hello! Welcome to {}. {}", support.company_name, identity(support));
    if !support.founded.is_empty() {
        text.push_str(&format!(
            "\n\n{} has been building software and digital solutions since {}.",
            support.company_name, support.founded
        ));
    }
    text.push_str(&format!(
        "\n\nI can help you with:\n\
         • Information about our {} services and solutions\n\
         • Company background and expertise\n\
         • Booking or cancelling a service\n\
         • Our contact details\n\n\
         What would you like to know?",
        service_count
    ));
    text
}

/// Canned answer for a company fact. `None` when the fact isn't configured.
pub fn basic_info(topic: InfoTopic, support: &SupportConfig) -> Option<String> {
    match topic {
        InfoTopic::Identity => Some(format!(
            "{} I'm here to help you with information about our services and solutions.",
            identity(support)
        )),
        InfoTopic::Founded if support.founded.is_empty() => None,
        InfoTopic::Founded if support.location.is_empty() => Some(format!(
            "{} was founded in {}.",
            support.company_name, support.founded
        )),
        InfoTopic::Founded => Some(format!(
            "{} was founded in {} in {}.",
            support.company_name, support.founded, support.location
        )),
        InfoTopic::Address if support.address.is_empty() => None,
        InfoTopic::Address => Some(format!(
            "{} is located at: {}",
            support.company_name, support.address
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_core::{ContactError, StaticContacts};

    struct FailingSource;

    #[async_trait]
    impl ContactSource for FailingSource {
        async fn fetch(&self) -> Result<Vec<ContactEntry>, ContactError> {
            Err(ContactError::NotConfigured)
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    fn directory() -> Vec<ContactEntry> {
        vec![
            ContactEntry::new("Phone Number", "(+94) 117 433 3333"),
            ContactEntry::new("Email", "info@adeonatech.net"),
            ContactEntry::new("Linkedin Profile", "https://www.linkedin.com/company/adeona-technologies"),
            ContactEntry::new("X Profile", "https://x.com/adeonatech"),
            ContactEntry::new("Facebook Profile", "https://www.facebook.com/adeonatech"),
        ]
    }

    #[tokio::test]
    async fn test_failing_source_uses_fallback() {
        let fallback = vec![ContactEntry::new("Email", "info@adeonatech.net")];
        let (entries, used_fallback) = contact_entries(&FailingSource, &fallback, 5).await;
        assert!(used_fallback);
        assert_eq!(entries, fallback);
    }

    #[tokio::test]
    async fn test_empty_source_uses_fallback() {
        let fallback = vec![ContactEntry::new("Email", "info@adeonatech.net")];
        let (entries, used_fallback) =
            contact_entries(&StaticContacts::new(Vec::new()), &fallback, 5).await;
        assert!(used_fallback);
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_live_source_preferred() {
        let (entries, used_fallback) =
            contact_entries(&StaticContacts::new(directory()), &[], 5).await;
        assert!(!used_fallback);
        assert_eq!(entries.len(), 5);
    }

    #[test]
    fn test_social_selection() {
        let picked = select_for_message("Do you have a Facebook page?", directory());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].label, "Facebook Profile");

        let picked = select_for_message("what's your twitter", directory());
        assert_eq!(picked[0].label, "X Profile");

        assert_eq!(select_for_message("what's your phone number", directory()).len(), 5);
    }

    #[test]
    fn test_formatting() {
        let text = format_contacts(&directory()[..2], "(+94) 117 433 3333");
        assert!(text.contains("Phone Number: (+94) 117 433 3333"));
        assert!(text.contains("Email: info@adeonatech.net"));
        assert!(format_contacts(&[], "123").contains("123"));

        let services = vec!["Lead Manager".to_string(), "Digital Bill".to_string()];
        let text = format_services(&services, "Adeona Technologies");
        assert!(text.contains("• Lead Manager"));
        assert!(text.contains("book"));
    }

    fn support() -> SupportConfig {
        SupportConfig {
            company_name: "Adeona Technologies".into(),
            phone: "(+94) 117 433 3333".into(),
            email: "info@adeonatech.net".into(),
            website: "https://adeonatech.net/".into(),
            assistant_name: "AdeonaBot".into(),
            founded: "2017".into(),
            location: "Colombo, Sri Lanka".into(),
            address: String::new(),
        }
    }

    #[test]
    fn test_greeting_introduces_assistant() {
        let text = greeting(&support(), 16);
        assert!(text.starts_with("Hello! Welcome to Adeona Technologies. I'm AdeonaBot"));
        assert!(text.contains("since 2017"));
        assert!(text.contains("our 16 services"));
    }

    #[test]
    fn test_basic_info_answers_configured_facts() {
        assert_eq!(
            basic_info(InfoTopic::Founded, &support()).as_deref(),
            Some("Adeona Technologies was founded in 2017 in Colombo, Sri Lanka.")
        );
        assert!(basic_info(InfoTopic::Identity, &support())
            .unwrap()
            .starts_with("I'm AdeonaBot"));
        assert_eq!(basic_info(InfoTopic::Address, &support()), None);

        let anonymous = SupportConfig {
            assistant_name: String::new(),
            ..support()
        };
        assert!(basic_info(InfoTopic::Identity, &anonymous)
            .unwrap()
            .starts_with("I'm the virtual assistant for Adeona Technologies."));
    }
}
