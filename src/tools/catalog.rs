//! Token Metrics endpoint catalog
//!
//! Every tool is a read-only GET against one v2 endpoint. Arguments are
//! forwarded as query parameters unchanged; the upstream API owns
//! validation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::{ToolContext, ToolDescriptor, ToolHandler};
use crate::Error;
use crate::protocol::ToolsCallResult;

/// JSON Schema type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `"type": "string"`
    String,
    /// `"type": "number"`
    Number,
}

impl ParamKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
        }
    }
}

/// One input parameter
#[derive(Debug)]
pub struct Param {
    /// Query parameter name
    pub name: &'static str,
    /// Schema type
    pub kind: ParamKind,
    /// Description shown to clients
    pub description: &'static str,
}

/// One upstream endpoint exposed as a tool
#[derive(Debug)]
pub struct Endpoint {
    /// Tool name
    pub name: &'static str,
    /// Path appended to the base URL
    pub path: &'static str,
    /// Tool description
    pub description: &'static str,
    /// Accepted parameters
    pub params: &'static [Param],
    /// Names of required parameters
    pub required: &'static [&'static str],
}

impl Endpoint {
    /// JSON Schema for this endpoint's arguments
    #[must_use]
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| {
                (
                    p.name.to_string(),
                    json!({ "type": p.kind.as_str(), "description": p.description }),
                )
            })
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }
}

const fn param(name: &'static str, kind: ParamKind, description: &'static str) -> Param {
    Param {
        name,
        kind,
        description,
    }
}

const TOKEN_ID: Param = param(
    "token_id",
    ParamKind::String,
    "Comma-separated string of token IDs (e.g., '1,2,3')",
);
const TOKEN_ID_SINGLE: Param = param("token_id", ParamKind::Number, "Token ID. Example: 3375");
const TOKEN_NAME: Param = param(
    "token_name",
    ParamKind::String,
    "Comma Separated Crypto Asset Names (e.g., Bitcoin, Ethereum)",
);
const SYMBOL: Param = param(
    "symbol",
    ParamKind::String,
    "Comma-separated string of token symbols (e.g., 'BTC,ETH,ADA')",
);
const SYMBOL_SINGLE: Param = param("symbol", ParamKind::String, "Token Symbol. Example: BTC");
const CATEGORY: Param = param(
    "category",
    ParamKind::String,
    "Comma Separated category name. Example: yield farming,defi",
);
const EXCHANGE: Param = param(
    "exchange",
    ParamKind::String,
    "Comma Separated exchange name. Example: binance,gate",
);
const START_DATE: Param = param(
    "startDate",
    ParamKind::String,
    "Start Date accepts date as a string - YYYY-MM-DD format. Example: 2023-10-01",
);
const END_DATE: Param = param(
    "endDate",
    ParamKind::String,
    "End Date accepts date as a string - YYYY-MM-DD format. Example: 2023-10-10",
);
const MARKETCAP: Param = param(
    "marketcap",
    ParamKind::String,
    "Minimum MarketCap in $ (USD) of the token. Example: 100",
);
const FDV: Param = param(
    "fdv",
    ParamKind::String,
    "Minimum fully diluted valuation in $ (USD) of the token. Example: 100",
);
const VOLUME: Param = param(
    "volume",
    ParamKind::String,
    "Minimum 24h trading volume in $ (USD) of the token. Example: 100",
);
const LIMIT: Param = param(
    "limit",
    ParamKind::Number,
    "Limit the number of results returned. Default is 50. Maximum is 100.",
);
const PAGE: Param = param(
    "page",
    ParamKind::Number,
    "Enables pagination and data retrieval control by skipping a specified number of items before fetching data. Page should be a non-negative integer, with 1 indicating the beginning of the dataset.",
);

/// Every endpoint, in `tools/list` order
pub static ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        name: "get_token_data",
        path: "/tokens",
        description: "Fetch token data from Token Metrics API. Provide either token_id or symbol (or both) along with optional filters.",
        params: &[
            TOKEN_ID,
            TOKEN_NAME,
            SYMBOL,
            CATEGORY,
            EXCHANGE,
            param(
                "blockchain_address",
                ParamKind::String,
                "Use this parameter to search tokens through specific blockchains and contract addresses. Input the blockchain name followed by a colon and then the contract address. Example: binance-smart-chain:0x57185189118c7e786cafd5c71f35b16012fa95ad",
            ),
            LIMIT,
            PAGE,
        ],
        required: &[],
    },
    Endpoint {
        name: "get_token_price",
        path: "/price",
        description: "Fetch token price from Token Metrics API. Provide token_id.",
        params: &[TOKEN_ID],
        required: &["token_id"],
    },
    Endpoint {
        name: "get_top_tokens_by_market_cap",
        path: "/top-market-cap-tokens",
        description: "Fetch the list of coins with top market cap from Token Metrics API.",
        params: &[
            param(
                "top_k",
                ParamKind::Number,
                "Specifies the number of top cryptocurrencies to retrieve, based on their market capitalization. Default is 50. Maximum is 100. Example: 100",
            ),
            PAGE,
        ],
        required: &[],
    },
    Endpoint {
        name: "get_tokens_hourly_trading_signals",
        path: "/hourly-trading-signals",
        description: "Fetch token(s) hourly AI generated trading signals for long and short positions from Token Metrics API.",
        params: &[TOKEN_ID, LIMIT, PAGE],
        required: &["token_id"],
    },
    Endpoint {
        name: "get_tokens_hourly_ohlcv",
        path: "/hourly-ohlcv",
        description: "Fetch hourly OHLCV (Open, High, Low, Close, Volume) data for token(s) for a specific date or date range from Token Metrics API.",
        params: &[TOKEN_ID, TOKEN_NAME, START_DATE, END_DATE, SYMBOL, LIMIT, PAGE],
        required: &[],
    },
    Endpoint {
        name: "get_tokens_investor_grade",
        path: "/investor-grades",
        description: "Fetch token(s) long term grades, including Technology and Fundamental metrics for a specific date or date range from Token Metrics API.",
        params: &[
            TOKEN_ID,
            START_DATE,
            END_DATE,
            SYMBOL,
            CATEGORY,
            EXCHANGE,
            MARKETCAP,
            FDV,
            VOLUME,
            param(
                "investorGrade",
                ParamKind::String,
                "Minimum TM Investor Grade of the token. Example: 17",
            ),
            LIMIT,
            PAGE,
        ],
        required: &[],
    },
    Endpoint {
        name: "get_market_metrics",
        path: "/market-metrics",
        description: "Fetch Market Analytics from Token Metrics API. They provide insight into the full Crypto Market, including the Bullish/Bearish Market indicator for a specific date or date range.",
        params: &[START_DATE, END_DATE, LIMIT, PAGE],
        required: &[],
    },
    Endpoint {
        name: "get_tokens_ai_report",
        path: "/ai-reports",
        description: "Fetch token(s) AI-generated reports providing comprehensive analyses of cryptocurrency tokens, including deep dives, investment analyses, and code reviews from Token Metrics API.",
        params: &[TOKEN_ID, SYMBOL, LIMIT, PAGE],
        required: &[],
    },
    Endpoint {
        name: "get_crypto_investors",
        path: "/crypto-investors",
        description: "Fetch the latest list of crypto investors and their scores from Token Metrics API.",
        params: &[LIMIT, PAGE],
        required: &[],
    },
    Endpoint {
        name: "get_tokens_resistance_and_support",
        path: "/resistance-support",
        description: "Fetch token(s) historical levels of resistance and support from Token Metrics API. Provide token_id or symbol.",
        params: &[TOKEN_ID, SYMBOL, LIMIT, PAGE],
        required: &["token_id", "symbol"],
    },
    Endpoint {
        name: "get_token_tm_grade",
        path: "/tm-grade",
        description: "Fetch token's latest TM Grade and Fundamental Grade insights, including signals, momentum, and 24-hour percentage changes from Token Metrics API.",
        params: &[TOKEN_ID_SINGLE],
        required: &["token_id"],
    },
    Endpoint {
        name: "get_token_tm_grade_historical",
        path: "/tm-grade-history",
        description: "Fetch token's historical TM Grade and Fundamental Grade data over a specified date range, including signals and momentum trends from Token Metrics API.",
        params: &[TOKEN_ID_SINGLE, START_DATE, END_DATE, LIMIT, PAGE],
        required: &["token_id"],
    },
    Endpoint {
        name: "get_token_technology_grade",
        path: "/technology-grade",
        description: "Fetch token's latest Technology Grade, reflecting its tech strength and innovation ranking compared to other tokens from Token Metrics API.",
        params: &[TOKEN_ID_SINGLE, SYMBOL_SINGLE, START_DATE, END_DATE, LIMIT, PAGE],
        required: &[],
    },
    Endpoint {
        name: "get_tokens_quant_metrics",
        path: "/quantmetrics",
        description: "Fetch the latest quantitative metrics for token(s). Note that Token Metrics pricing data starts on 2019-01-01 for most tokens.",
        params: &[
            TOKEN_ID, SYMBOL, CATEGORY, EXCHANGE, MARKETCAP, FDV, VOLUME, LIMIT, PAGE,
        ],
        required: &[],
    },
    Endpoint {
        name: "get_tokens_scenario_analysis",
        path: "/scenario-analysis",
        description: "Fetch token(s) price prediction based on different Crypto Market scenarios from Token Metrics API.",
        params: &[TOKEN_ID, SYMBOL, LIMIT, PAGE],
        required: &[],
    },
    Endpoint {
        name: "get_tokens_correlation",
        path: "/correlation",
        description: "Fetch token(s) Top 10 and Bottom 10 correlated tokens from the top 100 market cap tokens from Token Metrics API.",
        params: &[TOKEN_ID, TOKEN_NAME, SYMBOL, CATEGORY, EXCHANGE, LIMIT, PAGE],
        required: &[],
    },
    Endpoint {
        name: "get_sentiment",
        path: "/sentiments",
        description: "Fetch the hourly sentiment score for Twitter, Reddit, and all the News, including quick summary of what happened from Token Metrics API.",
        params: &[],
        required: &[],
    },
    Endpoint {
        name: "get_moonshot_tokens",
        path: "/moonshot-tokens",
        description: "Fetch the AI-curated token picks (Moonshots) with high breakout potential based on grades, sentiment, volume, and on-chain data from Token Metrics API.",
        params: &[
            param(
                "type",
                ParamKind::String,
                "Accepts \"active\" or \"past\" to fetch respective moonshots. Defaults to \"active\" if not provided",
            ),
            LIMIT,
            PAGE,
        ],
        required: &[],
    },
    Endpoint {
        name: "get_indices",
        path: "/indices",
        description: "Fetch active and passive crypto indices with performance and market data from Token Metrics API.",
        params: &[
            param(
                "indicesType",
                ParamKind::String,
                "Filter to return indices by type: \"active\" for actively managed, \"passive\" for passively managed.",
            ),
            LIMIT,
            PAGE,
        ],
        required: &[],
    },
    Endpoint {
        name: "get_indices_holdings",
        path: "/indices-holdings",
        description: "Fetch the current holdings of the given Index, along with their respective weight in percentage from Token Metrics API.",
        params: &[param("id", ParamKind::String, "Id of the index. Example: 1")],
        required: &["id"],
    },
    Endpoint {
        name: "get_indices_performance",
        path: "/indices-performance",
        description: "Fetch historical performance data for a given index, including cumulative return on investment (ROI) over time from Token Metrics API.",
        params: &[
            param("id", ParamKind::Number, "Id of the index. Example: 1"),
            START_DATE,
            END_DATE,
            LIMIT,
            PAGE,
        ],
        required: &["id"],
    },
];

/// Descriptors for every endpoint in [`ENDPOINTS`]
#[must_use]
pub fn descriptors() -> Vec<ToolDescriptor> {
    ENDPOINTS
        .iter()
        .map(|endpoint| ToolDescriptor {
            name: endpoint.name.to_string(),
            description: endpoint.description.to_string(),
            input_schema: endpoint.input_schema(),
            factory: Arc::new(move |ctx: ToolContext| -> Box<dyn ToolHandler> {
                Box::new(EndpointTool { endpoint, ctx })
            }),
        })
        .collect()
}

/// Handler bound to one endpoint and one call's credential
struct EndpointTool {
    endpoint: &'static Endpoint,
    ctx: ToolContext,
}

#[async_trait]
impl ToolHandler for EndpointTool {
    async fn call(&self, arguments: Value) -> ToolsCallResult {
        let result = self
            .ctx
            .upstream
            .get(self.endpoint.path, &arguments, &self.ctx.credential)
            .await;

        match result {
            Ok(data) => {
                debug!(tool = self.endpoint.name, "Tool call succeeded");
                ToolsCallResult::text(serde_json::to_string_pretty(&data).unwrap_or_default())
            }
            Err(e) => {
                warn!(tool = self.endpoint.name, error = %e, "Tool call failed");
                ToolsCallResult::error_text(format!("Error fetching data: {}", failure_reason(&e)))
            }
        }
    }
}

/// Failure text without the error-kind prefix
pub(crate) fn failure_reason(e: &Error) -> String {
    match e {
        Error::Transport(msg) | Error::Protocol(msg) => msg.clone(),
        other => other.to_string(),
    }
}
