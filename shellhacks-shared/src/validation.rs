/// Registration and application validation rules
///
/// The rules are data, not code: [`ValidationRules`] deserializes from a
/// TOML/JSON/YAML file through the `config` crate, and any key left out keeps
/// its default. Validation never stops at the first problem; every violated
/// rule contributes one human-readable reason.
///
/// # Example
///
/// ```
/// use shellhacks_shared::models::applicant::ApplicantProfile;
/// use shellhacks_shared::validation::{RegistrationDraft, ValidationRules};
///
/// let rules = ValidationRules::default();
/// let draft = RegistrationDraft {
///     first_name: "Ada".to_string(),
///     last_name: "Lovelace".to_string(),
///     email: "ada@x.com".to_string(),
///     password: "pw123".to_string(),
///     profile: ApplicantProfile::default(),
/// };
/// assert!(rules.validate_registration(&draft).is_ok());
/// ```
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::ValidateEmail;

use crate::models::applicant::ApplicantProfile;

/// Reasons a submission was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Validation failed: {}", .0.join("; "))]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    pub fn single(reason: impl Into<String>) -> Self {
        Self(vec![reason.into()])
    }

    pub fn reasons(&self) -> &[String] {
        &self.0
    }

    pub fn into_reasons(self) -> Vec<String> {
        self.0
    }
}

/// Error loading a rules file
#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("Failed to load validation rules: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Inconsistent validation rules: {0}")]
    Inconsistent(String),
}

/// Account fields collected at registration
#[derive(Debug, Clone, Default)]
pub struct RegistrationDraft {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub profile: ApplicantProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub password_min_length: usize,
    pub max_field_length: usize,
    pub shirt_sizes: Vec<String>,

    /// Empty means any level of study is accepted
    pub levels_of_study: Vec<String>,

    pub graduation_year_min: i32,
    pub graduation_year_max: i32,
    pub phone_min_digits: usize,
    pub phone_max_digits: usize,

    /// camelCase profile keys that must be present on submission
    pub required_application_fields: Vec<String>,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            password_min_length: 5,
            max_field_length: 256,
            shirt_sizes: ["XS", "S", "M", "L", "XL", "XXL"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            levels_of_study: Vec::new(),
            graduation_year_min: 2020,
            graduation_year_max: 2035,
            phone_min_digits: 7,
            phone_max_digits: 15,
            required_application_fields: [
                "schoolName",
                "levelOfStudy",
                "graduationYear",
                "major",
                "shirtSize",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl ValidationRules {
    /// Loads rules from a file; the format follows the extension
    ///
    /// # Errors
    ///
    /// Returns `RulesError::Load` if the file is missing or malformed and
    /// `RulesError::Inconsistent` if the bounds contradict each other.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RulesError> {
        let rules: ValidationRules = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize()?;
        rules.check()?;
        Ok(rules)
    }

    /// Loads from `path` when given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, RulesError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    fn check(&self) -> Result<(), RulesError> {
        if self.graduation_year_min > self.graduation_year_max {
            return Err(RulesError::Inconsistent(
                "graduation_year_min exceeds graduation_year_max".to_string(),
            ));
        }
        if self.phone_min_digits > self.phone_max_digits {
            return Err(RulesError::Inconsistent(
                "phone_min_digits exceeds phone_max_digits".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks account fields plus any profile fields supplied up front
    pub fn validate_registration(&self, draft: &RegistrationDraft) -> Result<(), ValidationErrors> {
        let mut reasons = Vec::new();

        self.check_name("first name", &draft.first_name, &mut reasons);
        self.check_name("last name", &draft.last_name, &mut reasons);

        let email = draft.email.trim();
        if email.is_empty() {
            reasons.push("email is required".to_string());
        } else if email.len() > self.max_field_length || !email.validate_email() {
            reasons.push("email is invalid".to_string());
        }

        if let Err(e) = self.validate_password(&draft.password) {
            reasons.extend(e.into_reasons());
        }

        self.check_profile(&draft.profile, &mut reasons);
        finish(reasons)
    }

    /// Checks a (merged) profile at application time
    pub fn validate_application(&self, profile: &ApplicantProfile) -> Result<(), ValidationErrors> {
        let mut reasons = Vec::new();

        for key in &self.required_application_fields {
            if !profile.has_field(key) {
                reasons.push(format!("{} is required", key));
            }
        }

        self.check_profile(profile, &mut reasons);
        finish(reasons)
    }

    pub fn validate_password(&self, password: &str) -> Result<(), ValidationErrors> {
        let length = password.chars().count();
        if length < self.password_min_length {
            return Err(ValidationErrors::single(format!(
                "password must be at least {} characters",
                self.password_min_length
            )));
        }
        if length > self.max_field_length {
            return Err(ValidationErrors::single(format!(
                "password must be at most {} characters",
                self.max_field_length
            )));
        }
        Ok(())
    }

    fn check_name(&self, label: &str, value: &str, reasons: &mut Vec<String>) {
        let value = value.trim();
        if value.is_empty() {
            reasons.push(format!("{} is required", label));
        } else if value.chars().count() > self.max_field_length {
            reasons.push(format!("{} is too long", label));
        }
    }

    fn check_profile(&self, profile: &ApplicantProfile, reasons: &mut Vec<String>) {
        for (key, value) in profile.to_fields() {
            if let Some(text) = value.as_str() {
                if text.chars().count() > self.max_field_length {
                    reasons.push(format!("{} is too long", key));
                }
            }
        }

        if let Some(size) = &profile.shirt_size {
            if !self.shirt_sizes.iter().any(|s| s.eq_ignore_ascii_case(size.trim())) {
                reasons.push(format!(
                    "shirtSize must be one of {}",
                    self.shirt_sizes.join(", ")
                ));
            }
        }

        if let Some(level) = &profile.level_of_study {
            if !self.levels_of_study.is_empty()
                && !self
                    .levels_of_study
                    .iter()
                    .any(|l| l.eq_ignore_ascii_case(level.trim()))
            {
                reasons.push("levelOfStudy is not recognized".to_string());
            }
        }

        if let Some(year) = profile.graduation_year {
            if year < self.graduation_year_min || year > self.graduation_year_max {
                reasons.push(format!(
                    "graduationYear must be between {} and {}",
                    self.graduation_year_min, self.graduation_year_max
                ));
            }
        }

        if let Some(phone) = &profile.phone_number {
            if !self.phone_is_valid(phone) {
                reasons.push("phoneNumber is invalid".to_string());
            }
        }

        for (key, link) in [
            ("linkedIn", &profile.linked_in),
            ("portfolio", &profile.portfolio),
            ("github", &profile.github),
        ] {
            if let Some(link) = link {
                if !link.trim().is_empty() && !looks_like_url(link.trim()) {
                    reasons.push(format!("{} must be a link", key));
                }
            }
        }
    }

    fn phone_is_valid(&self, phone: &str) -> bool {
        let allowed = |c: char| c.is_ascii_digit() || " +-().".contains(c);
        if !phone.chars().all(allowed) {
            return false;
        }
        let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
        (self.phone_min_digits..=self.phone_max_digits).contains(&digits)
    }
}

fn finish(reasons: Vec<String>) -> Result<(), ValidationErrors> {
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(reasons))
    }
}

/// `[http(s)://]host.tld[/path]` with no whitespace
fn looks_like_url(link: &str) -> bool {
    let rest = link
        .strip_prefix("https://")
        .or_else(|| link.strip_prefix("http://"))
        .unwrap_or(link);
    let host = rest.split('/').next().unwrap_or_default();

    !link.chars().any(char::is_whitespace)
        && host.contains('.')
        && !host.starts_with('.')
        && !host.ends_with('.')
}
