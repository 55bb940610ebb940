use std::hint::black_box;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use portfolio_rs::OptimizerConfig;
use portfolio_rs::PortfolioEngine;
use portfolio_rs::ReturnsSeries;
use portfolio_rs::Strategy;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;

const OBSERVATIONS: usize = 1000;

fn universe(n: usize) -> ReturnsSeries {
  let mut rng = StdRng::seed_from_u64(11);
  let columns = (0..n)
    .map(|i| {
      let dist = Normal::new(0.0002 * i as f64, 0.01 + 0.002 * i as f64).unwrap();
      (
        format!("A{i}"),
        (0..OBSERVATIONS).map(|_| dist.sample(&mut rng)).collect::<Vec<f64>>(),
      )
    })
    .collect();
  ReturnsSeries::from_columns(columns).unwrap()
}

fn bench_strategies(c: &mut Criterion) {
  let mut group = c.benchmark_group("Strategies");

  for &n in &[5, 20, 50] {
    let returns = universe(n);
    for strategy in [
      Strategy::MinVariance,
      Strategy::MaxSharpe,
      Strategy::RiskParity,
      Strategy::BlackLitterman,
    ] {
      let mut config = OptimizerConfig::for_strategy(strategy);
      config.max_weight = Some(1.0);
      config.enforce_max_volatility = false;
      let engine = PortfolioEngine::new(config);
      group.bench_with_input(BenchmarkId::new(strategy.as_str(), n), &returns, |b, returns| {
        b.iter(|| black_box(engine.optimize(returns).unwrap()));
      });
    }
  }

  group.finish();
}

fn bench_frontier(c: &mut Criterion) {
  let returns = universe(20);
  let mut config = OptimizerConfig::for_strategy(Strategy::MeanVariance);
  config.max_weight = Some(1.0);
  let engine = PortfolioEngine::new(config);

  c.bench_function("efficient_frontier_20x25", |b| {
    b.iter(|| black_box(engine.efficient_frontier(&returns, 25).unwrap()));
  });
}

criterion_group!(benches, bench_strategies, bench_frontier);
criterion_main!(benches);
