use gwd_classify::{Classification, is_llm_command};
use gwd_core::{Category, Complexity};
use gwd_history::HistoryStore;
use gwd_resource::Load;

/// Floor and ceiling enforced on `execution_timeout` (spec §4.4 step 5),
/// unless the caller supplied `timeout_override`.
pub const MIN_TIMEOUT_SECS: u64 = 10;
pub const MAX_TIMEOUT_SECS: u64 = 1800;

/// History is only trusted once it has at least this many samples (spec
/// §4.4 step 2).
const MIN_HISTORY_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutEstimate {
    pub execution_timeout_secs: u64,
    pub stall_timeout_secs: u64,
}

/// Base `(execution, stall)` budgets by `(category, complexity)`, from the
/// default table in spec §6. Indexed `[category][complexity]`; `Unknown`
/// falls back to the `General` row per spec §4.4's "if classifier returns
/// `unknown`, use `(general, medium)` defaults".
const BASE_TABLE: [[(u64, u64); 5]; 5] = [
    // calculation: trivial, low, medium, high, extreme
    [(15, 5), (20, 5), (30, 5), (45, 5), (60, 5)],
    // code
    [(30, 10), (60, 15), (120, 30), (300, 60), (600, 60)],
    // data
    [(30, 10), (60, 15), (120, 30), (300, 60), (600, 60)],
    // file
    [(20, 5), (40, 10), (90, 15), (180, 30), (300, 45)],
    // general
    [(15, 5), (30, 10), (60, 15), (180, 30), (900, 60)],
];

fn table_row(category: Category) -> usize {
    match category {
        Category::Calculation => 0,
        Category::Code => 1,
        Category::Data => 2,
        Category::File => 3,
        Category::General | Category::Unknown => 4,
    }
}

fn table_col(complexity: Complexity) -> usize {
    match complexity {
        Complexity::Trivial => 0,
        Complexity::Low => 1,
        Complexity::Medium => 2,
        Complexity::High => 3,
        Complexity::Extreme => 4,
    }
}

fn base_execution_secs(category: Category, complexity: Complexity) -> u64 {
    BASE_TABLE[table_row(category)][table_col(complexity)].0
}

/// Combine classifier output, history, and resource load into
/// `(execution_timeout, stall_timeout)` per spec §4.4. Always returns a
/// valid pair — there are no error conditions.
pub async fn estimate(
    command: &str,
    classification: Classification,
    history: &dyn HistoryStore,
    load: Load,
    timeout_override: Option<u64>,
) -> TimeoutEstimate {
    let execution_timeout_secs = match timeout_override {
        // An explicit override is the caller stating a concrete budget; it
        // bypasses history/load scaling and the min/max clamp entirely.
        Some(secs) => secs,
        None => {
            let mut base = base_execution_secs(classification.category, classification.complexity);

            if let Some(entry) = history.get(classification.name_hash).await {
                if entry.n >= MIN_HISTORY_SAMPLES {
                    let from_history = ((1.5 * entry.p90_ms as f64) / 1000.0).ceil() as u64;
                    base = base.max(from_history);
                }
            }

            let scaled = (base as f64 * load.multiplier).ceil() as u64;
            scaled.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
        }
    };

    let stall_floor = if is_llm_command(command) { 30 } else { 5 };
    let stall_timeout_secs = stall_floor.max(execution_timeout_secs / 10);

    TimeoutEstimate {
        execution_timeout_secs,
        stall_timeout_secs,
    }
}
