use chrono::NaiveDate;
use tradegraph_models::{AgentRole, AnalystKind, SharedState, Speaker};

pub const PROPOSAL_INSTRUCTION: &str =
    "End your response with a line of the form 'FINAL TRANSACTION PROPOSAL: **BUY/HOLD/SELL**'.";

pub fn system_prompt(role: AgentRole) -> String {
    let body = match role {
        AgentRole::MarketAnalyst => {
            "You are a market analyst. Use daily price and volume data to describe the trend, \
             momentum, volatility and notable support or resistance levels. Cite specific \
             prices and dates. Finish with a short Markdown table of key observations."
        }
        AgentRole::FundamentalsAnalyst => {
            "You are a fundamentals analyst. Assess valuation, profitability, growth and balance \
             sheet strength from the company's reported metrics. Be specific about which \
             metrics support each conclusion."
        }
        AgentRole::NewsAnalyst => {
            "You are a news analyst. Summarize company news from the recent window and explain \
             how each development could move the stock. Separate facts from speculation."
        }
        AgentRole::SocialAnalyst => {
            "You are a social media and sentiment analyst. Judge public and insider sentiment \
             toward the company and how it has shifted over the recent window."
        }
        AgentRole::BullResearcher => {
            "You are the Bull Analyst. Build an evidence-based case for investing in the stock, \
             emphasizing growth potential, competitive advantages and positive indicators. \
             Engage directly with the bear's latest points and refute them."
        }
        AgentRole::BearResearcher => {
            "You are the Bear Analyst. Build an evidence-based case against investing in the \
             stock, emphasizing risks, weaknesses and negative indicators. Engage directly \
             with the bull's latest points and refute them."
        }
        AgentRole::ResearchManager => {
            "You are the portfolio manager and debate facilitator. Critically evaluate the bull \
             and bear debate and commit to a clear recommendation (Buy, Sell or Hold) backed \
             by the strongest arguments. Do not default to Hold simply because both sides \
             have merit. Then write an investment plan for the trader."
        }
        AgentRole::Trader => {
            "You are a trading agent. Turn the investment plan and analyst reports into a \
             concrete trading decision with entry, sizing and risk considerations."
        }
        AgentRole::AggressiveDebator => {
            "You are the Aggressive Risk Analyst. Champion high-reward opportunities in the \
             trader's plan and challenge overly cautious viewpoints point by point."
        }
        AgentRole::ConservativeDebator => {
            "You are the Conservative Risk Analyst. Protect capital, minimize volatility and \
             point out where the trader's plan exposes the firm to undue risk."
        }
        AgentRole::NeutralDebator => {
            "You are the Neutral Risk Analyst. Weigh the upside and downside of the trader's \
             plan and argue for a balanced, sustainable approach."
        }
        AgentRole::RiskManager => {
            "You are the risk management judge. Evaluate the risk debate and the trader's plan, \
             then issue the final decision: Buy, Sell or Hold. Explain the reasoning with \
             direct references to the debate and refine the trader's plan where needed."
        }
    };

    match role {
        AgentRole::Trader | AgentRole::RiskManager => format!("{body}\n\n{PROPOSAL_INSTRUCTION}"),
        _ => body.to_string(),
    }
}

fn lessons_block(lessons: &[String]) -> String {
    if lessons.is_empty() {
        return "## Lessons from past decisions\nNo past lessons recorded.".to_string();
    }
    let items = lessons
        .iter()
        .map(|l| format!("- {l}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("## Lessons from past decisions\n{items}")
}

fn section(title: &str, body: Option<&str>) -> String {
    format!("## {title}\n{}", body.unwrap_or("(not available)"))
}

pub fn analyst_task(kind: AnalystKind, ticker: &str, trade_date: NaiveDate) -> String {
    format!(
        "Write the {} for {ticker} as of {trade_date}. Use the available tools to gather data \
         before writing; do not invent figures.",
        kind.report_title().to_lowercase()
    )
}

pub fn debater_task(speaker: Speaker, state: &SharedState, lessons: &[String]) -> String {
    let (debate, context) = match speaker {
        Speaker::Bull | Speaker::Bear => (state.investment_debate(), None),
        _ => (
            state.risk_debate(),
            Some(section("Trader's proposal", state.trader_plan())),
        ),
    };
    let history = if debate.is_empty() {
        "(no statements yet; you open the debate)".to_string()
    } else {
        debate.transcript()
    };
    let latest_opponent = debate
        .latest_opposing(speaker)
        .map(|i| debate.turns()[i].content.as_str())
        .unwrap_or("(none yet)");

    let mut parts = vec![
        format!("Ticker: {}  Trade date: {}", state.ticker(), state.trade_date()),
        state.reports_digest(),
    ];
    parts.extend(context);
    parts.push(section("Debate so far", Some(&history)));
    parts.push(section("Latest opposing argument", Some(latest_opponent)));
    parts.push(lessons_block(lessons));
    parts.push(format!(
        "Respond as the {} in a conversational style, without special formatting.",
        speaker.label()
    ));
    parts.join("\n\n")
}

pub fn research_manager_task(state: &SharedState, lessons: &[String]) -> String {
    [
        format!("Ticker: {}  Trade date: {}", state.ticker(), state.trade_date()),
        state.reports_digest(),
        section("Debate history", Some(&state.investment_debate().transcript())),
        lessons_block(lessons),
        "Give your recommendation and the investment plan for the trader.".to_string(),
    ]
    .join("\n\n")
}

pub fn trader_task(state: &SharedState, lessons: &[String]) -> String {
    [
        format!("Ticker: {}  Trade date: {}", state.ticker(), state.trade_date()),
        state.reports_digest(),
        section("Proposed investment plan", state.investment_plan()),
        lessons_block(lessons),
        "Decide on the trade.".to_string(),
    ]
    .join("\n\n")
}

pub fn risk_manager_task(state: &SharedState, lessons: &[String]) -> String {
    [
        format!("Ticker: {}  Trade date: {}", state.ticker(), state.trade_date()),
        section("Trader's proposal", state.trader_plan()),
        section("Risk debate history", Some(&state.risk_debate().transcript())),
        lessons_block(lessons),
        "Issue the final decision.".to_string(),
    ]
    .join("\n\n")
}

pub const EMPTY_REPLY_NUDGE: &str =
    "Your previous reply contained no usable content. Reply again with your complete answer as plain text.";

#[cfg(test)]
mod tests {
    use super::*;
    use tradegraph_models::AnalystReport;

    fn state() -> SharedState {
        let mut s = SharedState::new("NVDA", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        s.set_report(
            AnalystKind::Market,
            AnalystReport::Available {
                content: "Strong uptrend".to_string(),
            },
        )
        .unwrap();
        s
    }

    #[test]
    fn decision_roles_get_proposal_format() {
        assert!(system_prompt(AgentRole::Trader).contains("FINAL TRANSACTION PROPOSAL"));
        assert!(system_prompt(AgentRole::RiskManager).contains("FINAL TRANSACTION PROPOSAL"));
        assert!(!system_prompt(AgentRole::BullResearcher).contains("FINAL TRANSACTION PROPOSAL"));
    }

    #[test]
    fn bull_opening_has_no_opponent() {
        let text = debater_task(Speaker::Bull, &state(), &[]);
        assert!(text.contains("Strong uptrend"));
        assert!(text.contains("you open the debate"));
        assert!(text.contains("## Latest opposing argument\n(none yet)"));
        assert!(text.contains("No past lessons recorded."));
    }

    #[test]
    fn bear_sees_bull_argument() {
        let mut s = state();
        s.investment_debate_mut()
            .push(0, Speaker::Bull, "Data center demand is exploding".to_string());
        let text = debater_task(Speaker::Bear, &s, &["Momentum faded last time".to_string()]);
        assert!(text.contains("## Latest opposing argument\nData center demand is exploding"));
        assert!(text.contains("- Momentum faded last time"));
    }

    #[test]
    fn risk_debaters_see_trader_plan() {
        let mut s = state();
        s.set_trader_plan("Buy 100 shares. FINAL TRANSACTION PROPOSAL: **BUY**".to_string())
            .unwrap();
        let text = debater_task(Speaker::Neutral, &s, &[]);
        assert!(text.contains("## Trader's proposal\nBuy 100 shares."));
        let judge = risk_manager_task(&s, &[]);
        assert!(judge.contains("FINAL TRANSACTION PROPOSAL: **BUY**"));
    }

    #[test]
    fn missing_sections_are_marked() {
        let text = trader_task(&state(), &[]);
        assert!(text.contains("## Proposed investment plan\n(not available)"));
        assert!(analyst_task(AnalystKind::News, "NVDA", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap())
            .starts_with("Write the news report for NVDA as of 2024-05-10"));
    }
}
