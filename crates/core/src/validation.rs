//! Request payloads and the schema checks that turn them into stored bodies.
//!
//! Every text field is trimmed before its length is checked, and the trimmed
//! value is what gets stored. Lengths count characters, not bytes.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{
    AboutSection, Blog, BlogStatus, Category, Contact, ContactStatus, DocumentId, Homepage,
    Product, ProductStatus, Tag,
};

const MAX_URL_LEN: usize = 2048;
const MAX_PRICE_CENTS: i64 = 100_000_000;
const MAX_POSITION: i64 = 1000;

/// A payload field that failed its schema check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl CategoryInput {
    pub fn validate(self) -> Result<Category, ValidationError> {
        let name = text("name", self.name, 1, 60)?;
        let slug = slug("slug", self.slug, &name, 80)?;
        let description = text("description", self.description, 0, 500)?;
        Ok(Category {
            name,
            slug,
            description,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

impl TagInput {
    pub fn validate(self) -> Result<Tag, ValidationError> {
        let name = text("name", self.name, 1, 40)?;
        let slug = slug("slug", self.slug, &name, 60)?;
        Ok(Tag { name, slug })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub status: Option<String>,
}

impl ProductInput {
    pub fn validate(self) -> Result<Product, ValidationError> {
        let name = text("name", self.name, 1, 120)?;
        let slug = slug("slug", self.slug, &name, 140)?;
        let description = text("description", self.description, 0, 5000)?;
        if !(0..=MAX_PRICE_CENTS).contains(&self.price_cents) {
            return Err(ValidationError::new(
                "price_cents",
                format!("must be between 0 and {MAX_PRICE_CENTS}"),
            ));
        }
        let images = urls("images", self.images, 10)?;
        let category_ids = ids("category_ids", self.category_ids, 10)?;
        let tag_ids = ids("tag_ids", self.tag_ids, 20)?;
        let status = match self.status {
            None => ProductStatus::default(),
            Some(raw) => ProductStatus::parse(raw.trim())
                .ok_or_else(|| one_of("status", &["active", "draft", "archived"]))?,
        };

        Ok(Product {
            name,
            slug,
            description,
            price_cents: self.price_cents as u64,
            images,
            category_ids,
            tag_ids,
            featured: self.featured,
            status,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlogInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    pub content: String,
    #[serde(default)]
    pub cover_image: Option<String>,
    pub author: String,
    #[serde(default)]
    pub category_ids: Vec<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl BlogInput {
    /// Validates the payload. `published_at` is left unset; callers stamp it
    /// with [`Blog::stamp_publication`] once the previous version is known.
    pub fn validate(self) -> Result<Blog, ValidationError> {
        let title = text("title", self.title, 1, 200)?;
        let slug = slug("slug", self.slug, &title, 220)?;
        let excerpt = text("excerpt", self.excerpt, 0, 500)?;
        let content = text("content", self.content, 1, 50_000)?;
        let cover_image = optional_url("cover_image", self.cover_image)?;
        let author = text("author", self.author, 1, 80)?;
        let category_ids = ids("category_ids", self.category_ids, 10)?;
        let tag_ids = ids("tag_ids", self.tag_ids, 20)?;
        let status = match self.status {
            None => BlogStatus::default(),
            Some(raw) => BlogStatus::parse(raw.trim())
                .ok_or_else(|| one_of("status", &["draft", "published"]))?,
        };

        Ok(Blog {
            title,
            slug,
            excerpt,
            content,
            cover_image,
            author,
            category_ids,
            tag_ids,
            status,
            published_at: None,
        })
    }
}

/// Public contact form submission.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
}

impl ContactInput {
    pub fn validate(self) -> Result<Contact, ValidationError> {
        Ok(Contact {
            name: text("name", self.name, 1, 100)?,
            email: email("email", self.email)?,
            phone: optional_text("phone", self.phone, 30)?,
            subject: text("subject", self.subject, 1, 150)?,
            message: text("message", self.message, 1, 5000)?,
            status: ContactStatus::New,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactStatusInput {
    pub status: String,
}

impl ContactStatusInput {
    pub fn validate(self) -> Result<ContactStatus, ValidationError> {
        ContactStatus::parse(self.status.trim())
            .ok_or_else(|| one_of("status", &["new", "read", "replied", "archived"]))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HomepageInput {
    pub hero_title: String,
    #[serde(default)]
    pub hero_subtitle: String,
    #[serde(default)]
    pub hero_image: Option<String>,
    #[serde(default)]
    pub cta_label: String,
    #[serde(default)]
    pub cta_url: Option<String>,
    #[serde(default)]
    pub featured_product_ids: Vec<String>,
}

impl HomepageInput {
    pub fn validate(self) -> Result<Homepage, ValidationError> {
        Ok(Homepage {
            hero_title: text("hero_title", self.hero_title, 1, 120)?,
            hero_subtitle: text("hero_subtitle", self.hero_subtitle, 0, 300)?,
            hero_image: optional_url("hero_image", self.hero_image)?,
            cta_label: text("cta_label", self.cta_label, 0, 40)?,
            cta_url: optional_url("cta_url", self.cta_url)?,
            featured_product_ids: ids("featured_product_ids", self.featured_product_ids, 12)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AboutSectionInput {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub position: i64,
}

impl AboutSectionInput {
    pub fn validate(self) -> Result<AboutSection, ValidationError> {
        if !(0..=MAX_POSITION).contains(&self.position) {
            return Err(ValidationError::new(
                "position",
                format!("must be between 0 and {MAX_POSITION}"),
            ));
        }
        Ok(AboutSection {
            title: text("title", self.title, 1, 120)?,
            body: text("body", self.body, 1, 10_000)?,
            icon: text("icon", self.icon, 0, 60)?,
            image: optional_url("image", self.image)?,
            position: self.position as u32,
        })
    }
}

/// Lowercases `source` and joins its ASCII alphanumeric runs with hyphens.
pub fn slugify(source: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(source.len());
    let mut pending_hyphen = false;
    for ch in source.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug.truncate(max_len);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

fn text(field: &str, value: String, min: usize, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min {
        let message = if min == 1 {
            "is required".to_string()
        } else {
            format!("must be at least {min} characters")
        };
        return Err(ValidationError::new(field, message));
    }
    if len > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn optional_text(
    field: &str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value {
        None => Ok(None),
        Some(raw) => {
            let value = text(field, raw, 0, max)?;
            Ok(Some(value).filter(|value| !value.is_empty()))
        }
    }
}

fn slug(
    field: &str,
    explicit: Option<String>,
    source: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let explicit = explicit
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    let Some(value) = explicit else {
        let derived = slugify(source, max);
        if derived.is_empty() {
            return Err(ValidationError::new(
                field,
                "could not be derived, provide one explicitly",
            ));
        }
        return Ok(derived);
    };

    if value.len() > max {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    let well_formed = value.split('-').all(|part| {
        !part.is_empty()
            && part
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    });
    if !well_formed {
        return Err(ValidationError::new(
            field,
            "may only contain lowercase letters, digits and single hyphens",
        ));
    }
    Ok(value)
}

fn url(field: &str, value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"));
    let valid = match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !trimmed.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ValidationError::new(field, "must be an absolute http(s) URL"));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(ValidationError::new(
            field,
            format!("must be at most {MAX_URL_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

fn optional_url(field: &str, value: Option<String>) -> Result<Option<String>, ValidationError> {
    match value {
        Some(raw) if !raw.trim().is_empty() => url(field, raw).map(Some),
        _ => Ok(None),
    }
}

fn urls(field: &str, values: Vec<String>, max: usize) -> Result<Vec<String>, ValidationError> {
    if values.len() > max {
        return Err(ValidationError::new(
            field,
            format!("must contain at most {max} entries"),
        ));
    }
    values
        .into_iter()
        .enumerate()
        .map(|(idx, value)| url(&format!("{field}[{idx}]"), value))
        .collect()
}

fn email(field: &str, value: String) -> Result<String, ValidationError> {
    let value = text(field, value, 3, 254)?;
    let invalid = || ValidationError::new(field, "must be a valid email address");
    let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || value.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    Ok(value)
}

/// Parses reference ids, dropping repeats while keeping first-seen order.
fn ids(field: &str, values: Vec<String>, max: usize) -> Result<Vec<DocumentId>, ValidationError> {
    let mut parsed: Vec<DocumentId> = Vec::with_capacity(values.len());
    for (idx, raw) in values.iter().enumerate() {
        let id = DocumentId::parse(raw).map_err(|_| {
            ValidationError::new(format!("{field}[{idx}]"), "must be a valid document id")
        })?;
        if !parsed.contains(&id) {
            parsed.push(id);
        }
    }
    if parsed.len() > max {
        return Err(ValidationError::new(
            field,
            format!("must contain at most {max} entries"),
        ));
    }
    Ok(parsed)
}

fn one_of(field: &str, allowed: &[&str]) -> ValidationError {
    ValidationError::new(field, format!("must be one of: {}", allowed.join(", ")))
}
