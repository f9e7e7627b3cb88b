//! Task category definitions

use serde::{Deserialize, Serialize};

/// The ten evaluation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Coding,
    StructuredOutput,
    Summarization,
    Reasoning,
    MultiTurnMemory,
    DataExtraction,
    SqlGeneration,
    ToolUse,
    HallucinationRobustness,
    LongContextStress,
}

impl Category {
    pub fn all() -> Vec<Category> {
        vec![
            Category::Coding,
            Category::StructuredOutput,
            Category::Summarization,
            Category::Reasoning,
            Category::MultiTurnMemory,
            Category::DataExtraction,
            Category::SqlGeneration,
            Category::ToolUse,
            Category::HallucinationRobustness,
            Category::LongContextStress,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Coding => "coding",
            Category::StructuredOutput => "structured_output",
            Category::Summarization => "summarization",
            Category::Reasoning => "reasoning",
            Category::MultiTurnMemory => "multi_turn_memory",
            Category::DataExtraction => "data_extraction",
            Category::SqlGeneration => "sql_generation",
            Category::ToolUse => "tool_use",
            Category::HallucinationRobustness => "hallucination_robustness",
            Category::LongContextStress => "long_context_stress",
        }
    }

    /// Human-readable label for reports
    pub fn label(&self) -> &'static str {
        match self {
            Category::Coding => "Coding",
            Category::StructuredOutput => "Structured Output",
            Category::Summarization => "Summarization",
            Category::Reasoning => "Reasoning",
            Category::MultiTurnMemory => "Multi-turn Memory",
            Category::DataExtraction => "Data Extraction",
            Category::SqlGeneration => "SQL Generation",
            Category::ToolUse => "Tool Use",
            Category::HallucinationRobustness => "Hallucination Robustness",
            Category::LongContextStress => "Long Context Stress",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "coding" | "code" => Ok(Category::Coding),
            "structured_output" | "json" => Ok(Category::StructuredOutput),
            "summarization" | "summary" => Ok(Category::Summarization),
            "reasoning" => Ok(Category::Reasoning),
            "multi_turn_memory" | "multi_turn" | "memory" => Ok(Category::MultiTurnMemory),
            "data_extraction" | "extraction" => Ok(Category::DataExtraction),
            "sql_generation" | "sql" => Ok(Category::SqlGeneration),
            "tool_use" | "tools" => Ok(Category::ToolUse),
            "hallucination_robustness" | "hallucination" => Ok(Category::HallucinationRobustness),
            "long_context_stress" | "long_context" => Ok(Category::LongContextStress),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for category in Category::all() {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!(Category::all().len(), 10);
    }

    #[test]
    fn test_aliases() {
        assert_eq!("SQL".parse::<Category>().unwrap(), Category::SqlGeneration);
        assert_eq!("multi-turn".parse::<Category>().unwrap(), Category::MultiTurnMemory);
        assert!("poetry".parse::<Category>().is_err());
    }
}
