//! Sample medicine catalog used by the demo binary.

use chrono::{Days, NaiveDate};
use memstore::InMemorySession;
use serde::Serialize;
use serde_json::Value;
use session::Entity;

/// Raw query served by the in-memory store: medicines of one dosage form.
pub const BY_DOSAGE_FORM: &str = "SELECT * FROM medicine_information WHERE dosage_form = ?";

const MAKERS: [(&str, &str, &str); 4] = [
    ("MF-01", "Northwind Pharma", "DK"),
    ("MF-02", "Contoso Labs", "US"),
    ("MF-03", "Fabrikam Health", "DE"),
    ("MF-04", "Tailspin Generics", "IN"),
];

const NAMES: [(&str, &str); 10] = [
    ("Amoxil", "Amoxicillin"),
    ("Brufen", "Ibuprofen"),
    ("Cetrin", "Cetirizine"),
    ("Dolo", "Paracetamol"),
    ("Exforge", "Amlodipine Valsartan"),
    ("Fucidin", "Fusidic Acid"),
    ("Glucophage", "Metformin"),
    ("Humira", "Adalimumab"),
    ("Stromectol", "Ivermectin"),
    ("Januvia", "Sitagliptin"),
];

const FORMS: [&str; 4] = ["tablet", "capsule", "syrup", "injection"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manufacturer {
    pub id: String,
    pub name: String,
    pub country: String,
}

impl Entity for Manufacturer {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn entity_name() -> &'static str {
        "manufacturer"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Medicine {
    pub id: String,
    pub name: String,
    pub active_ingredients: String,
    pub expiration_date: Option<NaiveDate>,
    pub dosage_form: String,
    pub manufacturer_id: Option<String>,
    pub discontinued: bool,
}

impl Entity for Medicine {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn entity_name() -> &'static str {
        "medicine"
    }

    fn relations() -> &'static [&'static str] {
        &["manufacturer"]
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be blank".into());
        }
        let capitalised = self
            .active_ingredients
            .split_whitespace()
            .all(|word| word.starts_with(|c: char| c.is_ascii_uppercase()));
        if self.active_ingredients.trim().is_empty() || !capitalised {
            return Err(format!(
                "active ingredients '{}' must be capitalised words",
                self.active_ingredients
            ));
        }
        Ok(())
    }
}

pub fn manufacturers() -> Vec<Manufacturer> {
    MAKERS
        .iter()
        .map(|(id, name, country)| Manufacturer {
            id: (*id).into(),
            name: (*name).into(),
            country: (*country).into(),
        })
        .collect()
}

/// `count` deterministic medicines.
pub fn medicines(count: usize) -> Vec<Medicine> {
    let base = NaiveDate::from_ymd_opt(2025, 1, 1);
    (0..count)
        .map(|i| {
            let (brand, ingredients) = NAMES[i % NAMES.len()];
            let strength = 100 * (1 + i / NAMES.len());
            Medicine {
                id: format!("MED-{:04}", i + 1),
                name: format!("{brand} {strength}"),
                active_ingredients: ingredients.into(),
                expiration_date: if i % 11 == 0 {
                    None
                } else {
                    base.and_then(|d| d.checked_add_days(Days::new((i as u64 * 37) % 900)))
                },
                dosage_form: FORMS[i % FORMS.len()].into(),
                manufacturer_id: (i % 13 != 7).then(|| MAKERS[i % MAKERS.len()].0.to_string()),
                discontinued: i % 9 == 4,
            }
        })
        .collect()
}

/// An in-memory store holding the catalog. Discontinued medicines are
/// hidden unless a read ignores default filters.
pub fn open(seed: usize) -> InMemorySession {
    let session = InMemorySession::new()
        .with_rows(manufacturers())
        .with_rows(medicines(seed))
        .with_default_filter::<Medicine>(|m| !m.discontinued);
    session.register_raw_query::<Medicine>(BY_DOSAGE_FORM, |rows: &[Medicine], params: &[Value]| {
        let form = params.first().and_then(Value::as_str).unwrap_or_default();
        rows.iter()
            .filter(|m| m.dosage_form.eq_ignore_ascii_case(form))
            .cloned()
            .collect()
    });
    session
}
