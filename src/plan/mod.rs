//! 计划：结构化计划类型、LLM 输出解析与计划生成/重规划

pub mod parser;
pub mod producer;
pub mod prompts;
pub mod types;

pub use parser::{fallback_plan, parse_or_fallback, parse_plan_response};
pub use producer::PlanProducer;
pub use prompts::PromptSet;
pub use types::{Plan, Step, StepType, SubPlan};
