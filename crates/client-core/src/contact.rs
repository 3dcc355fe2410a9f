//! Phone identifier normalisation and caller display names
//!
//! The contact-resolution collaborator is consulted only to label a call
//! (`caller_name`, native UI handle text). It never takes part in
//! state-machine decisions; channel identity alone drives those.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::call::PhoneNumber;

/// Label used when nothing at all is known about a number
pub const UNKNOWN_CALLER_LABEL: &str = "Unbekannt";

/// Normalise a phone identifier to `+` and digits only.
///
/// Whitespace and punctuation are dropped and an international `00`
/// prefix becomes `+`.
///
/// ```rust
/// use callsync_client_core::contact::normalize_phone;
///
/// assert_eq!(normalize_phone("0049 170 123-45"), "+4917012345");
/// assert_eq!(normalize_phone("+49 (170) 12345"), "+4917012345");
/// ```
pub fn normalize_phone(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| *c == '+' || c.is_ascii_digit())
        .collect();

    match cleaned.strip_prefix("00") {
        Some(rest) => format!("+{}", rest),
        None => cleaned,
    }
}

/// Format a number for display when no name is available
pub fn format_phone_for_display(phone: &str) -> String {
    let normalized = normalize_phone(phone);

    if let Some(national) = normalized.strip_prefix("+49") {
        if national.len() >= 4 {
            return format!("Kontakt {}", &national[national.len() - 4..]);
        }
    }

    if normalized.starts_with('+') && normalized.len() > 7 {
        let digits: String = normalized.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() > 4 {
            let (head, tail) = digits.split_at(digits.len() - 4);
            return format!("+{}****{}", head, tail);
        }
    }

    if normalized.is_empty() {
        UNKNOWN_CALLER_LABEL.to_string()
    } else {
        normalized
    }
}

/// Where a resolved contact name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    /// A registered user's own profile
    UserProfile,
    /// The device address book
    DeviceContact,
    /// Nothing matched; the number itself was formatted
    FormattedPhone,
}

/// A resolved contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Display name
    pub name: String,
    /// Avatar, if the profile has one
    pub avatar_url: Option<String>,
    /// Normalised phone identifier
    pub phone: PhoneNumber,
    /// Which source produced the name
    pub source: ContactSource,
}

/// Minimal view of a registered user's profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Resolves a phone identifier to something presentable
pub trait ContactResolver: Send + Sync {
    /// Resolve `phone`; implementations should always return something
    /// displayable, falling back to a formatted number.
    fn resolve(&self, phone: &PhoneNumber) -> ContactInfo;
}

/// In-memory resolver over user profiles and device contacts.
///
/// Profiles win over device contacts; both are keyed by normalised number.
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    user_profiles: HashMap<String, UserProfile>,
    device_contacts: HashMap<String, String>,
    fallback_to_formatted: bool,
}

impl ContactBook {
    pub fn new() -> Self {
        Self {
            user_profiles: HashMap::new(),
            device_contacts: HashMap::new(),
            fallback_to_formatted: true,
        }
    }

    pub fn with_user_profile(mut self, phone: &str, profile: UserProfile) -> Self {
        self.user_profiles.insert(normalize_phone(phone), profile);
        self
    }

    pub fn with_device_contact(mut self, phone: &str, name: impl Into<String>) -> Self {
        self.device_contacts.insert(normalize_phone(phone), name.into());
        self
    }

    /// Disable the formatted-number fallback; unknown numbers are then
    /// labelled with the bare normalised number.
    pub fn without_formatted_fallback(mut self) -> Self {
        self.fallback_to_formatted = false;
        self
    }
}

impl ContactResolver for ContactBook {
    fn resolve(&self, phone: &PhoneNumber) -> ContactInfo {
        let key = phone.as_str();

        if let Some(profile) = self.user_profiles.get(key) {
            if let Some(name) = profile.name.as_ref().filter(|n| !n.is_empty()) {
                return ContactInfo {
                    name: name.clone(),
                    avatar_url: profile.avatar_url.clone(),
                    phone: phone.clone(),
                    source: ContactSource::UserProfile,
                };
            }
        }

        if let Some(name) = self.device_contacts.get(key) {
            return ContactInfo {
                name: name.clone(),
                avatar_url: None,
                phone: phone.clone(),
                source: ContactSource::DeviceContact,
            };
        }

        let name = if self.fallback_to_formatted {
            format_phone_for_display(key)
        } else if key.is_empty() {
            UNKNOWN_CALLER_LABEL.to_string()
        } else {
            key.to_string()
        };

        ContactInfo {
            name,
            avatar_url: None,
            phone: phone.clone(),
            source: ContactSource::FormattedPhone,
        }
    }
}
