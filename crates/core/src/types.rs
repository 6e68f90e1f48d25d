use std::{
    fmt,
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use ulid::{Generator, Ulid};

const ULID_LEN: usize = 26;

/// Identifier of a stored document.
///
/// Generated ids are ULIDs derived from the write timestamp, so sorting ids
/// lexically sorts documents by creation time. Cursor pagination relies on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Parses an identifier received from a client, normalising its case.
    pub fn parse(value: &str) -> Result<Self, InvalidId> {
        let trimmed = value.trim();
        if trimmed.len() != ULID_LEN {
            return Err(InvalidId(value.to_string()));
        }
        Ulid::from_string(trimmed)
            .map(|ulid| Self(ulid.to_string()))
            .map_err(|_| InvalidId(value.to_string()))
    }

    /// Wraps an id read back from storage, where it was validated on the way in.
    pub fn from_storage(value: String) -> Self {
        Self(value)
    }

    /// Fixed identifier for collections holding a single document.
    pub fn singleton(name: &'static str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of strictly increasing ids for one store.
///
/// Ids generated for the same millisecond, or for a clock that stepped back,
/// increment the previous id instead of drawing new random bits.
pub struct IdGenerator {
    inner: Mutex<Generator>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    pub fn next_id(&self, at: DateTime<Utc>) -> DocumentId {
        let at = SystemTime::from(at);
        let mut generator = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Overflow needs 2^80 ids within one millisecond.
        let ulid = generator
            .generate_from_datetime(at)
            .unwrap_or_else(|_| Ulid::from_datetime(at));
        DocumentId(ulid.to_string())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid document id: {0}")]
pub struct InvalidId(pub String);

/// A document body that lives in a named collection.
pub trait Collection: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Document as persisted, with identity and timestamps around the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: DocumentId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: T,
}

/// Compact form of a referenced document embedded in read models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub id: DocumentId,
    pub name: String,
    pub slug: String,
}

/// Collections whose documents can be referenced from other documents.
pub trait Summarize: Collection {
    fn summarize(stored: &Stored<Self>) -> Summary;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

impl Collection for Category {
    const NAME: &'static str = "categories";
}

impl Summarize for Category {
    fn summarize(stored: &Stored<Self>) -> Summary {
        Summary {
            id: stored.id.clone(),
            name: stored.body.name.clone(),
            slug: stored.body.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub slug: String,
}

impl Collection for Tag {
    const NAME: &'static str = "tags";
}

impl Summarize for Tag {
    fn summarize(stored: &Stored<Self>) -> Summary {
        Summary {
            id: stored.id.clone(),
            name: stored.body.name.clone(),
            slug: stored.body.slug.clone(),
        }
    }
}

/// Catalogue visibility of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    #[default]
    Draft,
    Archived,
}

impl ProductStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "draft" => Some(Self::Draft),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Draft => "draft",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: u64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<DocumentId>,
    #[serde(default)]
    pub tag_ids: Vec<DocumentId>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub status: ProductStatus,
}

impl Collection for Product {
    const NAME: &'static str = "products";
}

impl Summarize for Product {
    fn summarize(stored: &Stored<Self>) -> Summary {
        Summary {
            id: stored.id.clone(),
            name: stored.body.name.clone(),
            slug: stored.body.slug.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlogStatus {
    #[default]
    Draft,
    Published,
}

impl BlogStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub author: String,
    #[serde(default)]
    pub category_ids: Vec<DocumentId>,
    #[serde(default)]
    pub tag_ids: Vec<DocumentId>,
    #[serde(default)]
    pub status: BlogStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

impl Blog {
    /// Carries the first publication time across edits.
    ///
    /// `previous` is the `published_at` of the stored version, if any. A blog
    /// that is published for the first time is stamped with `now`.
    pub fn stamp_publication(&mut self, previous: Option<DateTime<Utc>>, now: DateTime<Utc>) {
        self.published_at = match (previous, self.status) {
            (Some(at), _) => Some(at),
            (None, BlogStatus::Published) => Some(now),
            (None, BlogStatus::Draft) => None,
        };
    }
}

impl Collection for Blog {
    const NAME: &'static str = "blogs";
}

/// Triage state of a contact form submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[default]
    New,
    Read,
    Replied,
    Archived,
}

impl ContactStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "read" => Some(Self::Read),
            "replied" => Some(Self::Replied),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Read => "read",
            Self::Replied => "replied",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    #[serde(default)]
    pub status: ContactStatus,
}

impl Collection for Contact {
    const NAME: &'static str = "contacts";
}

/// Landing page content. Only one document exists, see [`Homepage::DOCUMENT_ID`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Homepage {
    pub hero_title: String,
    #[serde(default)]
    pub hero_subtitle: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_image: Option<String>,
    #[serde(default)]
    pub cta_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta_url: Option<String>,
    #[serde(default)]
    pub featured_product_ids: Vec<DocumentId>,
}

impl Homepage {
    pub const DOCUMENT_ID: &'static str = "current";

    pub fn document_id() -> DocumentId {
        DocumentId::singleton(Self::DOCUMENT_ID)
    }
}

impl Collection for Homepage {
    const NAME: &'static str = "homepage";
}

/// One section of the "about" page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AboutSection {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub position: u32,
}

impl Collection for AboutSection {
    const NAME: &'static str = "about";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Stored<Product>,
    pub categories: Vec<Summary>,
    pub tags: Vec<Summary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlogView {
    #[serde(flatten)]
    pub blog: Stored<Blog>,
    pub categories: Vec<Summary>,
    pub tags: Vec<Summary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomepageView {
    #[serde(flatten)]
    pub homepage: Stored<Homepage>,
    pub featured_products: Vec<Summary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::{json, Value};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn generated_ids_follow_creation_order() {
        let first = IdGenerator::new().next_id(at(0));
        let second = IdGenerator::new().next_id(at(1));
        let third = IdGenerator::default().next_id(at(60));
        assert!(first < second);
        assert!(second < third);
    }

    #[test]
    fn id_generator_is_strictly_increasing_within_one_instant() {
        let ids = IdGenerator::new();
        let generated: Vec<_> = (0..200).map(|_| ids.next_id(at(0))).collect();
        let mut sorted = generated.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, generated);

        let later = ids.next_id(at(5));
        let stepped_back = ids.next_id(at(1));
        assert!(generated[199] < later);
        assert!(later < stepped_back);
    }

    #[test]
    fn parse_normalises_case_and_rejects_garbage() {
        let id = IdGenerator::new().next_id(at(0));
        let lower = id.as_str().to_lowercase();
        assert_eq!(DocumentId::parse(&lower).expect("lowercase parses"), id);

        assert!(DocumentId::parse("not-an-id").is_err());
        assert!(DocumentId::parse("").is_err());
        assert!(DocumentId::parse(Homepage::DOCUMENT_ID).is_err());
    }

    #[test]
    fn stored_document_flattens_body() {
        let stored = Stored {
            id: IdGenerator::new().next_id(at(0)),
            created_at: at(0),
            updated_at: at(5),
            body: Tag {
                name: "Summer".to_string(),
                slug: "summer".to_string(),
            },
        };
        let value = serde_json::to_value(&stored).expect("serialize");
        assert_eq!(value.get("name"), Some(&json!("Summer")));
        assert_eq!(value.get("id"), Some(&Value::String(stored.id.to_string())));

        let back: Stored<Tag> = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, stored);
    }

    #[test]
    fn publication_time_is_kept_after_first_publish() {
        let mut blog = Blog {
            title: "Hello".to_string(),
            slug: "hello".to_string(),
            excerpt: String::new(),
            content: "<p>Hi</p>".to_string(),
            cover_image: None,
            author: "Ana".to_string(),
            category_ids: Vec::new(),
            tag_ids: Vec::new(),
            status: BlogStatus::Draft,
            published_at: None,
        };
        blog.stamp_publication(None, at(0));
        assert_eq!(blog.published_at, None);

        blog.status = BlogStatus::Published;
        blog.stamp_publication(None, at(10));
        assert_eq!(blog.published_at, Some(at(10)));

        let first = blog.published_at;
        blog.status = BlogStatus::Draft;
        blog.stamp_publication(first, at(20) + Duration::days(1));
        assert_eq!(blog.published_at, Some(at(10)));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            ContactStatus::New,
            ContactStatus::Read,
            ContactStatus::Replied,
            ContactStatus::Archived,
        ] {
            assert_eq!(ContactStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProductStatus::parse("deleted"), None);
        assert_eq!(BlogStatus::parse("Published"), None);
    }
}
