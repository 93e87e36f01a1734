//! Category Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EcommerceError, Result};

string_enum! {
    /// What a category groups: products, services or both.
    pub enum CategoryKind {
        Product => "product",
        Service => "service",
        Both => "both",
    }
}

impl CategoryKind {
    /// `Both` matches either listing.
    pub fn matches(&self, wanted: CategoryKind) -> bool {
        *self == wanted || *self == CategoryKind::Both || wanted == CategoryKind::Both
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub kind: CategoryKind,
    pub active: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn create(name: impl Into<String>, slug: impl Into<String>, kind: CategoryKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            slug: slug.into(),
            description: None,
            parent_id: None,
            kind,
            active: true,
            display_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_parent(&mut self, parent_id: Option<Uuid>) -> Result<()> {
        if parent_id == Some(self.id) {
            return Err(EcommerceError::Validation("a category cannot be its own parent".into()));
        }
        self.parent_id = parent_id;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// The category and every category below it.
pub fn descendant_ids(categories: &[Category], root: Uuid) -> Vec<Uuid> {
    let mut found = vec![root];
    let mut cursor = 0;
    while cursor < found.len() {
        let parent = found[cursor];
        for child in categories.iter().filter(|c| c.parent_id == Some(parent)) {
            if !found.contains(&child.id) {
                found.push(child.id);
            }
        }
        cursor += 1;
    }
    found
}

/// Breadcrumb such as `"Skincare > Serums"`.
pub fn breadcrumb(categories: &[Category], id: Uuid) -> String {
    let mut names = Vec::new();
    let mut current = categories.iter().find(|c| c.id == id);
    while let Some(category) = current {
        if names.len() > categories.len() {
            break;
        }
        names.push(category.name.as_str());
        current = category
            .parent_id
            .and_then(|parent| categories.iter().find(|c| c.id == parent));
    }
    names.reverse();
    names.join(" > ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (Category, Category, Category) {
        let root = Category::create("Skincare", "skincare", CategoryKind::Product);
        let mut child = Category::create("Serums", "serums", CategoryKind::Product);
        child.set_parent(Some(root.id)).unwrap();
        let mut grandchild = Category::create("Vitamin C", "vitamin-c", CategoryKind::Product);
        grandchild.set_parent(Some(child.id)).unwrap();
        (root, child, grandchild)
    }

    #[test]
    fn test_descendants_and_breadcrumb() {
        let (root, child, grandchild) = tree();
        let all = vec![root.clone(), child.clone(), grandchild.clone()];
        let ids = descendant_ids(&all, root.id);
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&grandchild.id));
        assert_eq!(descendant_ids(&all, grandchild.id), vec![grandchild.id]);
        assert_eq!(breadcrumb(&all, grandchild.id), "Skincare > Serums > Vitamin C");
    }

    #[test]
    fn test_self_parent_rejected() {
        let mut category = Category::create("Massages", "massages", CategoryKind::Service);
        let own = category.id;
        assert!(category.set_parent(Some(own)).is_err());
    }

    #[test]
    fn test_kind_matching() {
        assert!(CategoryKind::Both.matches(CategoryKind::Service));
        assert!(CategoryKind::Product.matches(CategoryKind::Product));
        assert!(!CategoryKind::Product.matches(CategoryKind::Service));
    }
}
