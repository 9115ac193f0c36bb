use criterion::{criterion_group, criterion_main, Criterion};
use envmatrix::core::composer::CompositionContext;
use envmatrix::core::config::{load_config, ConfigFile};
use envmatrix::core::planner::{plan_execution, select_envs, PlannedEnv};
use envmatrix::core::run_environment;
use envmatrix::execution::RunOptions;
use std::fs;
use std::hint::black_box;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

const MATRIX: &str = "\
[tox]
envlist = py{27,36,37,38}-{lint,tests,cov}-{linux,mac}
skipsdist = true

[base]
deps =
    requests
    six

[testenv]
create_command =
whitelist_externals = sh
deps =
    {[base]deps}
    tests,cov: pytest
    cov: pytest-cov
    lint: flake8
    py27: mock
setenv =
    PLATFORM = {envname}
    mac: MACOSX_DEPLOYMENT_TARGET = 10.9
commands =
    lint: flake8 {posargs}
    tests: pytest {posargs:tests}
    cov: pytest --cov {posargs}
    !lint: sh -c 'true'
";

fn load(dir: &tempfile::TempDir) -> ConfigFile {
    let path = dir.path().join("tox.ini");
    fs::write(&path, MATRIX).unwrap();
    load_config(&path).unwrap()
}

fn bench_compose_matrix(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let config = load(&dir);
    let ctx = CompositionContext::default();

    c.bench_function("compose_matrix", |b| {
        b.iter(|| {
            let names = select_envs(&config, None, None);
            black_box(plan_execution(&config, &names, &ctx))
        });
    });
}

fn bench_run_environment(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = load(&dir);
    let names = vec!["py38-tests-linux".to_string()];
    let mut env = match plan_execution(&config, &names, &CompositionContext::default())
        .entries
        .pop()
    {
        Some(PlannedEnv::Ready(env)) => *env,
        _ => panic!("benchmark environment must compose"),
    };
    // Keep the run local: nothing to install, only the shell command.
    env.deps.clear();
    env.commands.retain(|c| c.program() == "sh");
    let opts = RunOptions {
        recreate: false,
        timeout: None,
        skipsdist: true,
        package_root: config.root.clone(),
        echo: false,
    };
    let token = CancellationToken::new();

    c.bench_function("run_environment", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(run_environment(&env, &opts, &token).await);
        });
    });
}

criterion_group!(benches, bench_compose_matrix, bench_run_environment);
criterion_main!(benches);
