//! Concrete record shapes used by the application views.
//!
//! The store itself is schemaless. These types are what call sites narrow a
//! [`RecordValue`] into right after retrieval. Field names are camelCase to
//! match what the web frontend writes.

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::{RecordKey, RecordValue};

/// A record type bound to a well-known key.
pub trait TypedRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The key this record is stored under.
    const KEY: &'static str;

    fn record_key() -> RecordKey {
        RecordKey(Self::KEY.to_string())
    }

    /// Narrow an untyped value into this record type.
    fn from_value(value: RecordValue) -> Result<Self, StorageError> {
        serde_json::from_value(value).map_err(|e| StorageError::Serialization {
            reason: format!("{} does not match its schema: {}", Self::KEY, e),
        })
    }

    fn to_value(&self) -> Result<RecordValue, StorageError> {
        serde_json::to_value(self).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })
    }
}

/// User profile and dietary preferences.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub display_name: String,
    pub household_size: u32,
    pub dietary_restrictions: Vec<String>,
    pub allergies: Vec<String>,
    pub daily_calorie_target: Option<u32>,
}

impl TypedRecord for Profile {
    const KEY: &'static str = "profile";
}

/// Meal slot within a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealSlot {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedMeal {
    pub slot: MealSlot,
    pub recipe_name: String,
    #[serde(default = "default_servings")]
    pub servings: u32,
}

fn default_servings() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedDay {
    pub date: NaiveDate,
    #[serde(default)]
    pub meals: Vec<PlannedMeal>,
}

/// Weekly meal plan.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MealPlan {
    pub week_start: Option<NaiveDate>,
    pub days: Vec<PlannedDay>,
}

impl MealPlan {
    /// Number of planned meals across the whole week.
    pub fn meal_count(&self) -> usize {
        self.days.iter().map(|d| d.meals.len()).sum()
    }
}

impl TypedRecord for MealPlan {
    const KEY: &'static str = "mealPlan";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PantryItem {
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
    #[serde(default)]
    pub barcode: Option<String>,
}

/// Pantry inventory. Written synchronously (critical key).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pantry(pub Vec<PantryItem>);

impl Pantry {
    /// Items expiring on or before `date`.
    pub fn expiring_by(&self, date: NaiveDate) -> impl Iterator<Item = &PantryItem> {
        self.0
            .iter()
            .filter(move |item| item.expires_on.is_some_and(|d| d <= date))
    }
}

impl TypedRecord for Pantry {
    const KEY: &'static str = "pantry";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShoppingList {
    pub items: Vec<ShoppingItem>,
}

impl ShoppingList {
    pub fn remaining(&self) -> impl Iterator<Item = &ShoppingItem> {
        self.items.iter().filter(|item| !item.checked)
    }
}

impl TypedRecord for ShoppingList {
    const KEY: &'static str = "shoppingList";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_valid_record_keys() {
        for key in [Profile::KEY, MealPlan::KEY, Pantry::KEY, ShoppingList::KEY] {
            assert!(RecordKey::new(key).is_ok(), "{key} must be a valid key");
        }
        assert_eq!(Pantry::record_key().as_str(), "pantry");
    }

    #[test]
    fn test_profile_tolerates_missing_fields() {
        let profile = Profile::from_value(json!({"displayName": "Sam"})).unwrap();
        assert_eq!(profile.display_name, "Sam");
        assert_eq!(profile.household_size, 0);
        assert!(profile.allergies.is_empty());
    }

    #[test]
    fn test_pantry_is_a_bare_array() {
        let value = json!([
            {"name": "rice", "quantity": 2.0, "unit": "kg"},
            {"name": "milk", "quantity": 1.0, "expiresOn": "2026-10-20"}
        ]);
        let pantry = Pantry::from_value(value.clone()).unwrap();
        assert_eq!(pantry.0.len(), 2);
        assert_eq!(pantry.to_value().unwrap()[0]["name"], "rice");

        let cutoff = NaiveDate::from_ymd_opt(2026, 10, 21).unwrap();
        let expiring: Vec<_> = pantry.expiring_by(cutoff).map(|i| i.name.as_str()).collect();
        assert_eq!(expiring, vec!["milk"]);
    }

    #[test]
    fn test_meal_plan_counts_meals() {
        let plan = MealPlan::from_value(json!({
            "weekStart": "2026-10-19",
            "days": [
                {"date": "2026-10-19", "meals": [
                    {"slot": "breakfast", "recipeName": "Oats"},
                    {"slot": "dinner", "recipeName": "Curry", "servings": 4}
                ]},
                {"date": "2026-10-20"}
            ]
        }))
        .unwrap();
        assert_eq!(plan.meal_count(), 2);
        assert_eq!(plan.days[0].meals[0].servings, 1);
    }

    #[test]
    fn test_schema_mismatch_is_reported() {
        let err = ShoppingList::from_value(json!({"items": "not a list"})).unwrap_err();
        assert!(err.to_string().contains("shoppingList"));
    }

    #[test]
    fn test_shopping_list_remaining() {
        let list = ShoppingList {
            items: vec![
                ShoppingItem {
                    name: "eggs".into(),
                    quantity: 12.0,
                    unit: None,
                    checked: true,
                },
                ShoppingItem {
                    name: "flour".into(),
                    quantity: 1.0,
                    unit: Some("kg".into()),
                    checked: false,
                },
            ],
        };
        let remaining: Vec<_> = list.remaining().map(|i| i.name.as_str()).collect();
        assert_eq!(remaining, vec!["flour"]);
    }
}
