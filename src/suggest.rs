//! Example prompts derived from the active dataset's columns

use explorer_types::{ColumnInfo, Dataset};

/// A clickable example question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamplePrompt {
    pub label: String,
    pub prompt: String,
}

impl ExamplePrompt {
    pub fn new(label: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: prompt.into(),
        }
    }
}

const NUMERIC_TYPES: &[&str] = &["int", "double", "float", "decimal", "numeric", "real", "hugeint"];
const IDENTIFIER_NAMES: &[&str] = &["id", "uuid", "key"];
const TEXT_TYPES: &[&str] = &["varchar", "char", "text", "string"];
const PREFERRED_CATEGORIES: &[&str] = &["name", "type", "category", "team", "status", "region"];

const PLAYER_NAME: &str = "player_name";
const PITCH_COUNT: &[&str] = &["pitches", "pitch_count"];

fn generic_prompts() -> Vec<ExamplePrompt> {
    vec![
        ExamplePrompt::new("Sample rows", "Show 10 sample rows"),
        ExamplePrompt::new("Row count", "How many rows are in the dataset?"),
        ExamplePrompt::new("Columns", "What columns are available and what do they contain?"),
    ]
}

fn baseball_prompts() -> Vec<ExamplePrompt> {
    vec![
        ExamplePrompt::new("Top pitchers", "Top 10 players by total pitches"),
        ExamplePrompt::new("Pitch mix", "Count of pitches by pitch type"),
        ExamplePrompt::new("Fastest pitches", "Top 10 fastest pitches with player name"),
        ExamplePrompt::new("Average speed", "Average release speed by player, top 10"),
        ExamplePrompt::new("Games per player", "Number of distinct games per player"),
        ExamplePrompt::new("Busiest games", "Top 5 games by number of pitches"),
    ]
}

struct Normalized {
    name: String,
    column_type: String,
    original: String,
}

impl From<&ColumnInfo> for Normalized {
    fn from(c: &ColumnInfo) -> Self {
        Self {
            name: c.name.to_lowercase(),
            column_type: c.column_type.to_lowercase(),
            original: c.name.clone(),
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Build example prompts for `dataset`. Deterministic; ties go to the
/// earliest declared column.
pub fn suggest(dataset: Option<&Dataset>) -> Vec<ExamplePrompt> {
    let columns: Vec<Normalized> = match dataset {
        Some(d) if !d.columns.is_empty() => d.columns.iter().map(Normalized::from).collect(),
        _ => return generic_prompts(),
    };

    let has_player = columns.iter().any(|c| c.name == PLAYER_NAME);
    let has_pitches = columns.iter().any(|c| PITCH_COUNT.contains(&c.name.as_str()));
    if has_player && has_pitches {
        return baseball_prompts();
    }

    let numeric: Vec<&Normalized> = columns
        .iter()
        .filter(|c| contains_any(&c.column_type, NUMERIC_TYPES))
        .collect();
    let measure = numeric
        .iter()
        .find(|c| !contains_any(&c.name, IDENTIFIER_NAMES))
        .or_else(|| numeric.first())
        .copied();

    let text: Vec<&Normalized> = columns
        .iter()
        .filter(|c| contains_any(&c.column_type, TEXT_TYPES))
        .collect();
    let category = text
        .iter()
        .find(|c| contains_any(&c.name, PREFERRED_CATEGORIES))
        .or_else(|| text.first())
        .copied();

    let mut prompts = generic_prompts();
    if let Some(m) = measure {
        prompts.push(ExamplePrompt::new(
            format!("Top by {}", m.original),
            format!("Top 10 rows by {}", m.original),
        ));
        if let Some(c) = category {
            prompts.push(ExamplePrompt::new(
                format!("{} by {}", m.original, c.original),
                format!("Average {} by {}", m.original, c.original),
            ));
        }
    }
    prompts
}
