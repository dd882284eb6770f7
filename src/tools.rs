//! Approved calculator tools exposed to the model via function calling.
//!
//! Two didactic calculators exist: the Liquidity Coverage Ratio and a
//! Gaussian Value-at-Risk. The model may call them during answer generation;
//! dispatch happens locally and every failure is reported back to the model
//! as an `{"ok": false, "error": ...}` payload rather than an HTTP error.

use async_openai::{
    error::OpenAIError,
    types::{ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType, FunctionObjectArgs},
};
use serde::Deserialize;
use serde_json::{json, Value};

/// z-scores for common confidence levels; the nearest entry is used.
const Z_TABLE: [(f64, f64); 4] = [
    (0.90, 1.2816),
    (0.95, 1.6449),
    (0.99, 2.3263),
    (0.995, 2.5758),
];

#[derive(Debug, Deserialize)]
struct LcrArgs {
    hqla: f64,
    net_outflows: f64,
}

#[derive(Debug, Deserialize)]
struct VarArgs {
    mean: f64,
    stdev: f64,
    horizon_days: i64,
    cl: f64,
}

/// Liquidity Coverage Ratio = HQLA / 30-day net cash outflows.
pub fn lcr_ratio(hqla: f64, net_outflows: f64) -> Value {
    if net_outflows <= 0.0 {
        return json!({ "ok": false, "error": "net_outflows must be > 0" });
    }
    let ratio = hqla / net_outflows;
    json!({
        "ok": true,
        "ratio": ratio,
        "explanation": format!("LCR = {hqla} / {net_outflows} = {ratio:.4}"),
    })
}

/// Gaussian VaR over a multi-day horizon (didactic, not production-ready).
///
/// Scales the daily mean linearly and the daily stdev by sqrt(horizon),
/// looks up the z-score nearest to the requested confidence level, and
/// reports the loss clipped at zero.
pub fn toy_var(mean: f64, stdev: f64, horizon_days: i64, cl: f64) -> Value {
    if !(0.0 < cl && cl < 1.0) {
        return json!({ "ok": false, "error": "cl must be between 0 and 1" });
    }
    if horizon_days <= 0 || stdev < 0.0 {
        return json!({ "ok": false, "error": "bad inputs" });
    }

    let (nearest, z) = Z_TABLE
        .iter()
        .copied()
        .min_by(|a, b| (a.0 - cl).abs().total_cmp(&(b.0 - cl).abs()))
        .unwrap_or(Z_TABLE[0]);

    let horizon = horizon_days as f64;
    let mu = mean * horizon;
    let sigma = stdev * horizon.sqrt();
    let var = -(mu + z * sigma);

    json!({
        "ok": true,
        "var": var.max(0.0),
        "used_confidence": nearest,
        "explanation": format!(
            "VaR ≈ -({mu:.4} + {z:.4} * {sigma:.4}) = {var:.4} (loss, clipped ≥ 0)"
        ),
    })
}

/// Dispatch a tool call by name with raw JSON arguments from the model.
pub fn call_tool(name: &str, arguments: &str) -> Value {
    match name {
        "lcr_ratio" => match serde_json::from_str::<LcrArgs>(arguments) {
            Ok(args) => lcr_ratio(args.hqla, args.net_outflows),
            Err(e) => json!({ "ok": false, "error": format!("bad arguments: {e}") }),
        },
        "toy_var" => match serde_json::from_str::<VarArgs>(arguments) {
            Ok(args) => toy_var(args.mean, args.stdev, args.horizon_days, args.cl),
            Err(e) => json!({ "ok": false, "error": format!("bad arguments: {e}") }),
        },
        other => json!({ "ok": false, "error": format!("Unknown tool: {other}") }),
    }
}

/// Tool schemas advertised to the model.
pub fn tool_specs() -> Result<Vec<ChatCompletionTool>, OpenAIError> {
    let lcr = ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(
            FunctionObjectArgs::default()
                .name("lcr_ratio")
                .description(
                    "Compute Liquidity Coverage Ratio given HQLA and 30-day net cash outflows.",
                )
                .parameters(json!({
                    "type": "object",
                    "properties": {
                        "hqla": {
                            "type": "number",
                            "description": "High-quality liquid assets amount"
                        },
                        "net_outflows": {
                            "type": "number",
                            "description": "30-day total net cash outflows"
                        }
                    },
                    "required": ["hqla", "net_outflows"]
                }))
                .build()?,
        )
        .build()?;

    let var = ChatCompletionToolArgs::default()
        .r#type(ChatCompletionToolType::Function)
        .function(
            FunctionObjectArgs::default()
                .name("toy_var")
                .description("Didactic Gaussian VaR calculator.")
                .parameters(json!({
                    "type": "object",
                    "properties": {
                        "mean": { "type": "number" },
                        "stdev": { "type": "number" },
                        "horizon_days": { "type": "integer" },
                        "cl": {
                            "type": "number",
                            "description": "Confidence in (0,1), e.g., 0.99"
                        }
                    },
                    "required": ["mean", "stdev", "horizon_days", "cl"]
                }))
                .build()?,
        )
        .build()?;

    Ok(vec![lcr, var])
}
