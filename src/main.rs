use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use portfolio_rs::BacktestConfig;
use portfolio_rs::BacktestReport;
use portfolio_rs::OptimizerConfig;
use portfolio_rs::PortfolioEngine;
use portfolio_rs::RebalanceFrequency;
use portfolio_rs::RebalanceSchedule;
use portfolio_rs::ReturnsSeries;
use portfolio_rs::Strategy;
use portfolio_rs::View;
use portfolio_rs::backtest;
use portfolio_rs::benchmark_reports;
use portfolio_rs::compare;
use prettytable::Table;
use prettytable::row;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use tracing::info;
use tracing_subscriber::EnvFilter;

const OBSERVATIONS: usize = 750;

/// Daily returns for a small crypto universe with a shared market factor.
fn sample_returns(seed: u64) -> Result<ReturnsSeries> {
  let universe = [
    ("BTC", 0.0010, 0.030, 0.9),
    ("ETH", 0.0012, 0.040, 0.8),
    ("SOL", 0.0016, 0.055, 0.7),
    ("BNB", 0.0007, 0.035, 0.6),
    ("LINK", 0.0005, 0.050, 0.5),
  ];
  let mut rng = StdRng::seed_from_u64(seed);
  let market = Normal::new(0.0, 1.0)?;
  let factor: Vec<f64> = (0..OBSERVATIONS).map(|_| market.sample(&mut rng)).collect();

  let mut columns = Vec::with_capacity(universe.len());
  for (name, mu, sd, beta) in universe {
    let noise = Normal::new(0.0, 1.0)?;
    let idio = (1.0f64 - beta * beta).sqrt();
    let col = factor
      .iter()
      .map(|f| mu + sd * (beta * f + idio * noise.sample(&mut rng)))
      .collect();
    columns.push((name, col));
  }
  let start = NaiveDate::from_ymd_opt(2022, 1, 3).context("invalid start date")?;
  let dates = start.iter_days().take(OBSERVATIONS).collect();
  Ok(ReturnsSeries::from_columns(columns)?.with_dates(dates)?)
}

fn fmt_opt(v: Option<f64>) -> String {
  v.map_or_else(|| "n/a".to_string(), |x| format!("{x:.3}"))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let returns = sample_returns(7)?;
  info!(
    assets = returns.n_assets(),
    observations = returns.n_observations(),
    "generated sample universe"
  );

  let mut table = Table::new();
  let mut header = row!["strategy", "return", "vol", "sharpe", "within cap", "status"];
  for asset in returns.assets() {
    header.add_cell(prettytable::Cell::new(asset));
  }
  table.add_row(header);

  for strategy in Strategy::ALL {
    let mut config = OptimizerConfig::for_strategy(strategy);
    config.risk_budgets = Some(vec![0.3, 0.25, 0.15, 0.2, 0.1]);
    config.target_return = Some(0.2);
    // crypto volatility sits far above the profile caps
    config.enforce_max_volatility = false;
    if strategy == Strategy::BlackLitterman {
      config.black_litterman.views = vec![
        View::absolute("BTC", 0.35, 0.6),
        View::relative("SOL", "ETH", 0.1, 0.4),
      ];
    }

    let res = match PortfolioEngine::new(config).optimize(&returns) {
      Ok(res) => res,
      Err(e) => {
        table.add_row(row![strategy, "-", "-", "-", "-", e]);
        continue;
      }
    };

    let mut line = row![
      strategy,
      format!("{:.3}", res.expected_return),
      format!("{:.3}", res.volatility),
      fmt_opt(res.sharpe_ratio),
      res.within_volatility_cap.map_or("n/a", |ok| if ok { "yes" } else { "no" }),
      format!("{:?}", res.status)
    ];
    for asset in returns.assets() {
      line.add_cell(prettytable::Cell::new(&fmt_opt(res.weight(asset))));
    }
    table.add_row(line);
  }
  table.printstd();

  let mut config = OptimizerConfig::for_strategy(Strategy::MaxSharpe);
  config.enforce_max_volatility = false;
  let weights = PortfolioEngine::new(config)
    .optimize(&returns)?
    .weights
    .context("max sharpe produced no allocation")?;
  let schedule = RebalanceSchedule::calendar(&returns, RebalanceFrequency::Monthly, weights)?;
  let config = BacktestConfig {
    trading_fee: 0.001,
    ..BacktestConfig::default()
  };
  let report = backtest(&returns, &schedule, &config)?;
  let s = &report.summary;

  let mut perf = Table::new();
  perf.add_row(row!["metric", "value"]);
  perf.add_row(row!["total return", format!("{:.2}%", s.total_return * 100.0)]);
  perf.add_row(row!["annualized return", format!("{:.2}%", s.annualized_return * 100.0)]);
  perf.add_row(row!["volatility", format!("{:.2}%", s.volatility * 100.0)]);
  perf.add_row(row!["sharpe", fmt_opt(s.sharpe_ratio)]);
  perf.add_row(row!["max drawdown", format!("{:.2}%", s.max_drawdown * 100.0)]);
  perf.add_row(row!["calmar", fmt_opt(s.calmar_ratio)]);
  perf.add_row(row!["VaR 95", format!("{:.4}", s.var_95)]);
  perf.add_row(row!["CVaR 95", format!("{:.4}", s.cvar_95)]);
  perf.add_row(row!["win rate", format!("{:.1}%", s.win_rate * 100.0)]);
  perf.add_row(row!["fees paid", format!("{:.5}", report.fees_paid)]);
  perf.printstd();

  let benchmarks = benchmark_reports(&returns, "BTC", &config)?;
  let named: Vec<(&str, &BacktestReport)> =
    benchmarks.iter().map(|(name, r)| (name.as_str(), r)).collect();
  let comparison = compare(&report, &named);

  let mut vs = Table::new();
  vs.add_row(row!["benchmark", "return diff", "sharpe diff", "vol diff", "max dd diff"]);
  for d in &comparison.benchmarks {
    vs.add_row(row![
      d.benchmark,
      format!("{:+.2}%", d.return_diff * 100.0),
      fmt_opt(d.sharpe_diff),
      format!("{:+.2}%", d.volatility_diff * 100.0),
      format!("{:+.2}%", d.max_drawdown_diff * 100.0)
    ]);
  }
  vs.printstd();
  for ranking in &comparison.rankings {
    info!(metric = ?ranking.metric, order = %ranking.order.join(" > "), "ranking");
  }

  Ok(())
}
