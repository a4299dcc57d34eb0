//! Natural-language task generation over a tool catalog.
//!
//! For each task the generator samples a tool set, picks one (or, for
//! multi-turn tasks, two to three) target tools, and renders a user query
//! from a category-matched template pool. Queries are deliberately varied so
//! the resulting dataset does not collapse onto a handful of phrasings.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use super::registry::{ToolRegistry, ToolSpec};
use super::{PromptTask, TaskKind};

/// Default system prompt describing the tool-invocation convention.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an intelligent AI assistant that can call tools to help users complete tasks.

Based on the user's question, select the appropriate tool to call. The tool call format is:

<function_call>
{
  "name": "tool_name@version",
  "arguments": {
    "parameter_name": "parameter_value"
  }
}
</function_call>

After receiving the tool result, give your final answer inside <final> tags:

<final>
The final answer goes here.
</final>

Make sure your tool calls are accurate and the arguments are complete."#;

const WEATHER_TEMPLATES: &[&str] = &[
    "Please check the weather in {city} for me",
    "What's the weather like in {city} today?",
    "I'd like to know the weather forecast for {city}",
    "How will the weather be in {city} this weekend?",
    "Check whether it will rain in {city} tomorrow",
    "What's the temperature in {city}?",
    "I'm travelling to {city}, should I bring an umbrella?",
    "What's the weather in {city} over the next three days",
];

const TIME_TEMPLATES: &[&str] = &[
    "What time is it right now?",
    "Please tell me the current time",
    "Can you check the time for me",
    "What's the exact time at the moment",
    "Tell me the current date and time",
];

const CALC_TEMPLATES: &[&str] = &[
    "Please calculate {expr}",
    "What does {expr} equal?",
    "Evaluate this expression: {expr}",
    "Work out {expr} for me",
    "What's the result of {expr}",
    "I want to know the answer to {expr}",
];

const SEARCH_TEMPLATES: &[&str] = &[
    "Search for information about {query}",
    "I'd like to learn about {query}",
    "Look up {query} for me",
    "What is {query}?",
    "Give me an overview of {query}",
    "Find some articles on {query}",
    "What are the key ideas behind {query}",
];

const TRANSLATE_TEMPLATES: &[&str] = &[
    "Please translate '{text}' into {lang}",
    "How do you say '{text}' in {lang}?",
    "Translate {text} to {lang} for me",
    "What's the {lang} translation of '{text}'",
];

const CURRENCY_TEMPLATES: &[&str] = &[
    "Convert {amount} {from} to {to}",
    "How much is {amount} {from} in {to}?",
    "What's {amount} {from} worth in {to}",
    "Help me exchange {amount} {from} for {to}",
];

const NEWS_TEMPLATES: &[&str] = &[
    "Show me the latest {category} news",
    "Any recent news in {category}?",
    "What's happening in {category} lately",
    "Find today's {category} headlines for me",
];

const GENERIC_TEMPLATES: &[&str] = &[
    "Please use the right tool to help me with this: {desc}",
    "I need help with something that requires {desc}",
    "Can you use {desc} for me",
];

const CITIES: &[&str] = &[
    "Beijing", "Shanghai", "Tokyo", "London", "Paris", "Berlin", "New York", "San Francisco",
    "Sydney", "Singapore", "Seoul", "Amsterdam", "Toronto", "Madrid", "Dubai", "Zurich",
];

const EXPRESSIONS: &[&str] = &[
    "1+1", "25*4", "100/5", "2^10", "sqrt(144)", "15-8", "7*8", "1000-567", "45+78", "(10+5)*2",
];

const SEARCH_QUERIES: &[&str] = &[
    "artificial intelligence",
    "machine learning",
    "natural language processing",
    "large language models",
    "quantum computing",
    "data science",
    "cloud computing",
    "computer vision",
    "reinforcement learning",
    "distributed systems",
];

const TEXTS: &[&str] = &[
    "hello", "thank you", "goodbye", "good morning", "good night", "sorry",
    "nice to meet you", "happy birthday", "good luck",
];

const LANGUAGES: &[&str] = &[
    "French", "German", "Japanese", "Spanish", "Korean", "Italian", "Portuguese", "Russian",
];

const CURRENCIES_FROM: &[&str] = &["USD", "EUR", "GBP", "JPY", "CNY"];
const CURRENCIES_TO: &[&str] = &["EUR", "USD", "GBP", "CHF", "HKD"];
const AMOUNTS: &[u32] = &[50, 100, 200, 500, 1000, 5000, 10000];

const NEWS_CATEGORIES: &[&str] = &[
    "technology", "sports", "finance", "entertainment", "science", "health", "world",
];

const MULTI_TURN_CONNECTORS: &[&str] = &["then", "after that", "also", "and additionally"];

/// How many tools to put in each task's tool set.
#[derive(Debug, Clone, Copy)]
pub enum ToolCount {
    /// Every task gets exactly this many tools.
    Fixed(usize),
    /// Each task gets a count sampled uniformly from `min..=max`.
    Range(usize, usize),
}

impl ToolCount {
    fn pick(&self, rng: &mut StdRng) -> usize {
        match *self {
            ToolCount::Fixed(n) => n.max(1),
            ToolCount::Range(min, max) => rng.gen_range(min.max(1)..=max.max(min).max(1)),
        }
    }
}

/// Generates prompt tasks from a tool catalog.
pub struct TaskGenerator<'a> {
    registry: &'a ToolRegistry,
    system_prompt: String,
}

impl<'a> TaskGenerator<'a> {
    /// Create a generator using the default system prompt.
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self {
            registry,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Override the system prompt used for generated tasks.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Generate a batch of tasks.
    ///
    /// # Arguments
    ///
    /// * `num_tasks` - Total number of tasks to generate
    /// * `multi_ratio` - Fraction (0.0-1.0) of tasks that should be multi-turn
    /// * `tool_count` - Tool-set size policy per task
    /// * `seed` - Optional RNG seed for reproducible task sets
    pub fn generate(
        &self,
        num_tasks: usize,
        multi_ratio: f64,
        tool_count: ToolCount,
        seed: Option<u64>,
    ) -> Vec<PromptTask> {
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        let num_multi = (num_tasks as f64 * multi_ratio.clamp(0.0, 1.0)) as usize;
        let num_single = num_tasks - num_multi;

        tracing::info!(
            single = num_single,
            multi = num_multi,
            "Generating prompt tasks"
        );

        let mut tasks = Vec::with_capacity(num_tasks);
        for _ in 0..num_single {
            if let Some(task) = self.single_turn_task(tool_count.pick(&mut rng), &mut rng) {
                tasks.push(task);
            }
        }
        for _ in 0..num_multi {
            if let Some(task) = self.multi_turn_task(tool_count.pick(&mut rng), &mut rng) {
                tasks.push(task);
            }
        }

        tracing::info!(count = tasks.len(), "Task generation complete");
        tasks
    }

    /// Generate one single-turn task over `n_tools` sampled tools.
    pub fn single_turn_task(&self, n_tools: usize, rng: &mut StdRng) -> Option<PromptTask> {
        let tools = self.registry.sample(n_tools, None, rng);
        if tools.is_empty() {
            tracing::warn!("Tool catalog is empty, skipping task");
            return None;
        }

        let target = tools.choose(rng)?.clone();
        let user_query = render_query(&target, rng);

        Some(PromptTask {
            id: format!("task-{}", Uuid::new_v4()),
            kind: TaskKind::SingleTurn,
            expected_tools: vec![target.qualified_name()],
            tools,
            system_prompt: self.system_prompt.clone(),
            history: Vec::new(),
            user_query,
        })
    }

    /// Generate one multi-turn task chaining 2-3 target tools into a
    /// compound query.
    pub fn multi_turn_task(&self, n_tools: usize, rng: &mut StdRng) -> Option<PromptTask> {
        let tools = self.registry.sample(n_tools.max(2), None, rng);
        if tools.len() < 2 {
            tracing::warn!("Not enough tools for a multi-turn task");
            return None;
        }

        let num_steps = rng.gen_range(2..=3.min(tools.len()));
        let targets: Vec<ToolSpec> = tools.choose_multiple(rng, num_steps).cloned().collect();

        let queries: Vec<String> = targets.iter().map(|t| render_query(t, rng)).collect();
        let mut combined = queries[0].clone();
        for (i, query) in queries.iter().enumerate().skip(1) {
            if i == queries.len() - 1 && queries.len() > 2 {
                combined.push_str(&format!(", and finally {}", lowercase_first(query)));
            } else {
                let connector = MULTI_TURN_CONNECTORS.choose(rng).copied().unwrap_or("then");
                combined.push_str(&format!(", {} {}", connector, lowercase_first(query)));
            }
        }

        Some(PromptTask {
            id: format!("task-{}", Uuid::new_v4()),
            kind: TaskKind::MultiTurn,
            expected_tools: targets.iter().map(ToolSpec::qualified_name).collect(),
            tools,
            system_prompt: self.system_prompt.clone(),
            history: Vec::new(),
            user_query: combined,
        })
    }
}

/// Render a natural-language query for a tool, matching templates on the tool
/// name and description.
fn render_query(tool: &ToolSpec, rng: &mut StdRng) -> String {
    let name = tool.name.to_lowercase();
    let desc = tool.description.to_lowercase();
    let contains = |needles: &[&str]| needles.iter().any(|n| name.contains(n) || desc.contains(n));

    if contains(&["weather", "forecast"]) {
        pick(WEATHER_TEMPLATES, rng).replace("{city}", pick(CITIES, rng))
    } else if contains(&["time", "clock", "date"]) {
        pick(TIME_TEMPLATES, rng).to_string()
    } else if contains(&["calc", "math", "compute"]) {
        pick(CALC_TEMPLATES, rng).replace("{expr}", pick(EXPRESSIONS, rng))
    } else if contains(&["search", "lookup", "query"]) {
        pick(SEARCH_TEMPLATES, rng).replace("{query}", pick(SEARCH_QUERIES, rng))
    } else if contains(&["translat"]) {
        pick(TRANSLATE_TEMPLATES, rng)
            .replace("{text}", pick(TEXTS, rng))
            .replace("{lang}", pick(LANGUAGES, rng))
    } else if contains(&["currency", "exchange", "convert"]) {
        pick(CURRENCY_TEMPLATES, rng)
            .replace("{amount}", &AMOUNTS.choose(rng).copied().unwrap_or(100).to_string())
            .replace("{from}", pick(CURRENCIES_FROM, rng))
            .replace("{to}", pick(CURRENCIES_TO, rng))
    } else if contains(&["news", "headline"]) {
        pick(NEWS_TEMPLATES, rng).replace("{category}", pick(NEWS_CATEGORIES, rng))
    } else {
        pick(GENERIC_TEMPLATES, rng).replace("{desc}", &tool.description)
    }
}

fn pick<'t>(pool: &[&'t str], rng: &mut StdRng) -> &'t str {
    pool.choose(rng).copied().unwrap_or("")
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
