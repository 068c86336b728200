//! Token pricing and per-request cost accounting.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::provider::{CompletionResponse, LlmProvider};

/// Per-token prices for one model, in US dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRates {
    pub input: Decimal,
    pub output: Decimal,
}

/// Sonnet-class pricing: $3 / MTok in, $15 / MTok out.
pub const SONNET_RATES: TokenRates = TokenRates {
    input: dec!(0.000003),
    output: dec!(0.000015),
};

const HAIKU_RATES: TokenRates = TokenRates {
    input: dec!(0.0000008),
    output: dec!(0.000004),
};

const OPUS_RATES: TokenRates = TokenRates {
    input: dec!(0.000015),
    output: dec!(0.000075),
};

/// Look up rates by model name. Unknown models are priced as Sonnet.
pub fn rates_for_model(model: &str) -> TokenRates {
    let model = model.to_ascii_lowercase();
    if model.contains("haiku") {
        HAIKU_RATES
    } else if model.contains("opus") {
        OPUS_RATES
    } else {
        SONNET_RATES
    }
}

/// Token usage from an LLM call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Monetary cost of this usage at the given rates.
    pub fn cost(&self, rates: TokenRates) -> Decimal {
        Decimal::from(self.input_tokens) * rates.input
            + Decimal::from(self.output_tokens) * rates.output
    }
}

impl From<&CompletionResponse> for TokenUsage {
    fn from(response: &CompletionResponse) -> Self {
        Self {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        }
    }
}

/// Cost of one completion, priced by the provider that served it.
pub fn response_cost(llm: &dyn LlmProvider, response: &CompletionResponse) -> Decimal {
    let (input, output) = llm.cost_per_token();
    TokenUsage::from(response).cost(TokenRates { input, output })
}

/// Running total of model spend for one pipeline invocation.
///
/// Owned by the orchestrator; fan-out stages return their per-call costs and
/// the orchestrator adds them once the whole stage has completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CostAccountant {
    total: Decimal,
    calls: u32,
}

impl CostAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, cost: Decimal) {
        self.total += cost;
        self.calls += 1;
    }

    pub fn extend<I: IntoIterator<Item = Decimal>>(&mut self, costs: I) {
        for cost in costs {
            self.add(cost);
        }
    }

    pub fn total(&self) -> Decimal {
        self.total
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }
}
