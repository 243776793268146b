use crate::schema::{Category, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Lower bounds, highest band first. Bounds are inclusive.
pub const CATEGORY_THRESHOLDS: [(Category, f64); 5] = [
    (Category::Diamante, 5_000_000.0),
    (Category::Esmeralda, 2_000_000.0),
    (Category::Ruby, 500_000.0),
    (Category::Topazio, 150_000.0),
    (Category::Pro, 1.0),
];

/// Every category in display order, "Sem Categoria" last.
pub const ALL_CATEGORIES: [Category; 6] = [
    Category::Diamante,
    Category::Esmeralda,
    Category::Ruby,
    Category::Topazio,
    Category::Pro,
    Category::SemCategoria,
];

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Diamante => "Diamante",
            Category::Esmeralda => "Esmeralda",
            Category::Ruby => "Ruby",
            Category::Topazio => "Topázio",
            Category::Pro => "Pro",
            Category::SemCategoria => "Sem Categoria",
        }
    }

    /// 0 for "Sem Categoria" up to 5 for Diamante.
    pub fn tier_rank(&self) -> u8 {
        match self {
            Category::Diamante => 5,
            Category::Esmeralda => 4,
            Category::Ruby => 3,
            Category::Topazio => 2,
            Category::Pro => 1,
            Category::SemCategoria => 0,
        }
    }

    /// Category reached by an aggregated point total.
    pub fn classify(points: f64) -> Category {
        CATEGORY_THRESHOLDS
            .iter()
            .find(|(_, bound)| points >= *bound)
            .map(|(category, _)| *category)
            .unwrap_or(Category::SemCategoria)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTotal {
    pub key: String,
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizedEntity {
    pub key: String,
    pub points: f64,
    pub category: Category,
}

pub fn classify_entities(totals: &[EntityTotal]) -> Vec<CategorizedEntity> {
    totals
        .iter()
        .map(|t| CategorizedEntity {
            key: t.key.clone(),
            points: t.points,
            category: Category::classify(t.points),
        })
        .collect()
}

/// Point totals per consolidated key, ordered by key.
pub fn totals_by_entity<'a, I>(transactions: I) -> Vec<EntityTotal>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for t in transactions {
        *totals.entry(t.consolidated_key.as_str()).or_insert(0.0) += t.points;
    }
    totals
        .into_iter()
        .map(|(key, points)| EntityTotal {
            key: key.to_string(),
            points,
        })
        .collect()
}

/// Distinct entities per category; every category is present, zero when empty.
pub fn count_by_category(entities: &[CategorizedEntity]) -> BTreeMap<Category, usize> {
    let mut seen: BTreeMap<Category, HashSet<&str>> =
        ALL_CATEGORIES.iter().map(|c| (*c, HashSet::new())).collect();
    for e in entities {
        seen.entry(e.category).or_default().insert(e.key.as_str());
    }
    seen.into_iter().map(|(c, keys)| (c, keys.len())).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryComparisonRow {
    pub category: Category,
    pub segment_count: usize,
    pub program_count: usize,
    /// Segment count over program count, 0.0 when the program has none.
    pub participation: f64,
}

/// Entities per category in a segment view against the whole program.
/// "Sem Categoria" is not listed.
pub fn compare_categories<'a, S, P>(segment: S, program: P) -> Vec<CategoryComparisonRow>
where
    S: IntoIterator<Item = &'a Transaction>,
    P: IntoIterator<Item = &'a Transaction>,
{
    let segment_counts = count_by_category(&classify_entities(&totals_by_entity(segment)));
    let program_counts = count_by_category(&classify_entities(&totals_by_entity(program)));

    ALL_CATEGORIES
        .iter()
        .filter(|c| **c != Category::SemCategoria)
        .map(|category| {
            let segment_count = segment_counts.get(category).copied().unwrap_or(0);
            let program_count = program_counts.get(category).copied().unwrap_or(0);
            let participation = if program_count > 0 {
                segment_count as f64 / program_count as f64
            } else {
                0.0
            };
            CategoryComparisonRow {
                category: *category,
                segment_count,
                program_count,
                participation,
            }
        })
        .collect()
}
