use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub created_at: String,
}

/// A user row together with its stored argon2 hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyMember {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub height: f64,
    pub weight: f64,
    pub dislikes: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewFamilyMember {
    pub name: String,
    pub age: i64,
    pub gender: String,
    pub height: f64,
    pub weight: f64,
    pub dislikes: String,
}

/// Storage category of an on-hand ingredient. Serialized with the labels the
/// ingredient forms and the model prompts use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngredientCategory {
    #[serde(rename = "肉・魚")]
    MeatFish,
    #[serde(rename = "野菜・果物")]
    Produce,
    #[serde(rename = "調味料")]
    Seasoning,
    #[serde(rename = "その他")]
    Other,
}

pub const INGREDIENT_CATEGORIES: [IngredientCategory; 4] = [
    IngredientCategory::MeatFish,
    IngredientCategory::Produce,
    IngredientCategory::Seasoning,
    IngredientCategory::Other,
];

// Substring hints for labels the model invents ("魚介類", "フルーツ類", ...).
const CATEGORY_HINTS: &[(&str, IngredientCategory)] = &[
    ("肉", IngredientCategory::MeatFish),
    ("魚", IngredientCategory::MeatFish),
    ("魚介", IngredientCategory::MeatFish),
    ("野菜", IngredientCategory::Produce),
    ("果物", IngredientCategory::Produce),
    ("フルーツ", IngredientCategory::Produce),
    ("調味料", IngredientCategory::Seasoning),
    ("スパイス", IngredientCategory::Seasoning),
];

impl IngredientCategory {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::MeatFish => "肉・魚",
            Self::Produce => "野菜・果物",
            Self::Seasoning => "調味料",
            Self::Other => "その他",
        }
    }

    /// Exact label match only. Used for user input.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        INGREDIENT_CATEGORIES
            .into_iter()
            .find(|c| c.label() == label.trim())
    }

    /// Lenient mapping for model output: exact label, then substring hints,
    /// then `Other`.
    #[must_use]
    pub fn from_loose(label: &str) -> Self {
        if let Some(exact) = Self::from_label(label) {
            return exact;
        }
        CATEGORY_HINTS
            .iter()
            .find(|(hint, _)| label.contains(hint))
            .map_or(Self::Other, |(_, category)| *category)
    }
}

impl std::fmt::Display for IngredientCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub category: IngredientCategory,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeHistory {
    pub id: i64,
    pub user_id: String,
    pub user_request: String,
    pub ai_response: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Favorite {
    pub id: i64,
    pub user_id: String,
    pub recipe: serde_json::Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingMemo {
    pub user_id: String,
    pub content: String,
    pub updated_at: String,
}

/// One ingredient the model spotted in a photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoCandidate {
    pub name: String,
    pub category: IngredientCategory,
    pub maybe: bool,
}

/// Photo candidates grouped by category, always carrying all four groups.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhotoCandidates {
    #[serde(rename = "肉・魚")]
    pub meat_fish: Vec<PhotoCandidate>,
    #[serde(rename = "野菜・果物")]
    pub produce: Vec<PhotoCandidate>,
    #[serde(rename = "調味料")]
    pub seasoning: Vec<PhotoCandidate>,
    #[serde(rename = "その他")]
    pub other: Vec<PhotoCandidate>,
}

impl PhotoCandidates {
    pub fn push(&mut self, candidate: PhotoCandidate) {
        let group = match candidate.category {
            IngredientCategory::MeatFish => &mut self.meat_fish,
            IngredientCategory::Produce => &mut self.produce,
            IngredientCategory::Seasoning => &mut self.seasoning,
            IngredientCategory::Other => &mut self.other,
        };
        group.push(candidate);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.meat_fish.len() + self.produce.len() + self.seasoning.len() + self.other.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        bail!("email is required");
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => bail!("Invalid email address '{email}'"),
    }
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("password must be at least {MIN_PASSWORD_LEN} characters");
    }
    Ok(())
}

/// Every family-member field is required; zero and blank values count as missing.
pub fn validate_family_member(
    name: Option<&str>,
    age: Option<i64>,
    gender: Option<&str>,
    height: Option<f64>,
    weight: Option<f64>,
    dislikes: Option<&str>,
) -> Result<NewFamilyMember> {
    fn text(field: &str, value: Option<&str>) -> Result<String> {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => bail!("{field} is required"),
        }
    }

    let name = text("name", name)?;
    let gender = text("gender", gender)?;
    let dislikes = text("dislikes", dislikes)?;
    let age = match age {
        Some(a) if a > 0 => a,
        Some(_) => bail!("age must be greater than 0"),
        None => bail!("age is required"),
    };
    let height = match height {
        Some(h) if h > 0.0 => h,
        Some(_) => bail!("height must be greater than 0"),
        None => bail!("height is required"),
    };
    let weight = match weight {
        Some(w) if w > 0.0 => w,
        Some(_) => bail!("weight must be greater than 0"),
        None => bail!("weight is required"),
    };

    Ok(NewFamilyMember {
        name,
        age,
        gender,
        height,
        weight,
        dislikes,
    })
}

/// Trim names and drop blanks. Order is preserved.
#[must_use]
pub fn clean_ingredient_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Portion label handed to the detail prompt: one portion per family member.
#[must_use]
pub fn servings_label(family_size: usize) -> String {
    format!("{}人前", family_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_exact_labels() {
        for c in INGREDIENT_CATEGORIES {
            assert_eq!(IngredientCategory::from_label(c.label()), Some(c));
        }
        assert_eq!(IngredientCategory::from_label("野菜"), None);
    }

    #[test]
    fn test_category_loose_mapping() {
        assert_eq!(
            IngredientCategory::from_loose("魚介類"),
            IngredientCategory::MeatFish
        );
        assert_eq!(
            IngredientCategory::from_loose("フルーツ"),
            IngredientCategory::Produce
        );
        assert_eq!(
            IngredientCategory::from_loose("スパイス類"),
            IngredientCategory::Seasoning
        );
        assert_eq!(
            IngredientCategory::from_loose("乳製品"),
            IngredientCategory::Other
        );
        assert_eq!(IngredientCategory::from_loose(""), IngredientCategory::Other);
    }

    #[test]
    fn test_category_serde_uses_labels() {
        let json = serde_json::to_string(&IngredientCategory::Produce).unwrap();
        assert_eq!(json, "\"野菜・果物\"");
        let parsed: IngredientCategory = serde_json::from_str("\"調味料\"").unwrap();
        assert_eq!(parsed, IngredientCategory::Seasoning);
    }

    #[test]
    fn test_photo_candidates_keep_group_order() {
        let mut groups = PhotoCandidates::default();
        groups.push(PhotoCandidate {
            name: "卵".to_string(),
            category: IngredientCategory::Other,
            maybe: false,
        });
        let json = serde_json::to_string(&groups).unwrap();
        let meat = json.find("肉・魚").unwrap();
        let other = json.find("その他").unwrap();
        assert!(meat < other);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_validate_family_member_valid() {
        let m = validate_family_member(
            Some(" 花子 "),
            Some(34),
            Some("女性"),
            Some(158.0),
            Some(50.5),
            Some("セロリ"),
        )
        .unwrap();
        assert_eq!(m.name, "花子");
        assert_eq!(m.age, 34);
    }

    #[test]
    fn test_validate_family_member_missing_name() {
        let err = validate_family_member(
            None,
            Some(34),
            Some("女性"),
            Some(158.0),
            Some(50.5),
            Some("セロリ"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_validate_family_member_zero_age() {
        assert!(
            validate_family_member(
                Some("太郎"),
                Some(0),
                Some("男性"),
                Some(120.0),
                Some(25.0),
                Some("ピーマン"),
            )
            .is_err()
        );
    }

    #[test]
    fn test_validate_family_member_blank_dislikes() {
        assert!(
            validate_family_member(
                Some("太郎"),
                Some(8),
                Some("男性"),
                Some(120.0),
                Some(25.0),
                Some("   "),
            )
            .is_err()
        );
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(validate_email(" Cook@Example.com ").unwrap(), "cook@example.com");
        assert!(validate_email("").is_err());
        assert!(validate_email("nobody").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn test_clean_ingredient_names() {
        let names = vec![" トマト".to_string(), String::new(), "きゅうり ".to_string()];
        assert_eq!(clean_ingredient_names(&names), vec!["トマト", "きゅうり"]);
    }

    #[test]
    fn test_servings_label() {
        assert_eq!(servings_label(0), "1人前");
        assert_eq!(servings_label(1), "1人前");
        assert_eq!(servings_label(4), "4人前");
    }
}
