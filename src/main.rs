use clap::{Arg, Command};
use std::path::PathBuf;
use trailersim::logging::{LogConfig, LogOutput, init_logging, parse_log_level};
use trailersim::output::{JsonLinesSink, NullSink, PoseSink};
use trailersim::scenario::ScenarioConfig;
use trailersim::simulation::{RunSummary, SimulationEngine};

fn main() {
    // コマンドライン引数の解析
    let matches = Command::new("trailersim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("連結車両シミュレーション (Articulated Trailer Simulation)")
        .long_about(
            "自転車モデルの牽引車と受動トレーラー列の運動学シミュレータ\n\
             固定時間刻みでチェーン全体を積分し、各ステップの姿勢を出力します。",
        )
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("FILE")
                .help("シナリオファイル(.yaml)のパスを指定")
                .long_help(
                    "実行するシナリオファイル(.yaml)のパスを指定します。\n\
                     指定しない場合は使用方法を表示します。",
                ),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .action(clap::ArgAction::SetTrue)
                .help("シナリオの情報のみ表示して終了")
                .conflicts_with("test"),
        )
        .arg(
            Arg::new("test")
                .short('t')
                .long("test")
                .action(clap::ArgAction::SetTrue)
                .help("組み込みデモシナリオ（8の字走行）を実行")
                .conflicts_with_all(["info", "scenario"]),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("姿勢を JSON Lines で書き出すファイル（シナリオの output.path より優先）"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("詳細出力レベル (-v: 基本, -vv: 詳細, -vvv: デバッグ)"),
        )
        .arg(
            Arg::new("log-output")
                .long("log-output")
                .value_name("TARGET")
                .value_parser(["console", "file", "both"])
                .default_value("console")
                .help("ログ出力先 (console, file, both)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("ログレベル (trace, debug, info, warn, error)。-v より優先"),
        )
        .get_matches();

    let verbose_level = matches.get_count("verbose");

    let mut log_config = LogConfig::from_verbosity(verbose_level);
    if let Some(level) = matches.get_one::<String>("log-level") {
        log_config.level = parse_log_level(level);
    }
    if let Some(target) = matches.get_one::<String>("log-output") {
        match target.parse::<LogOutput>() {
            Ok(output) => log_config.output = output,
            Err(e) => eprintln!("警告: {}", e),
        }
    }
    let _log_guard = match init_logging(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("エラー: ログ初期化に失敗しました: {}", e);
            std::process::exit(1);
        }
    };

    println!("連結車両シミュレーション - trailersim v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let output_path = matches.get_one::<String>("output").map(String::as_str);

    let result = if matches.get_flag("test") {
        println!("=== 組み込みデモモード ===");
        execute_scenario(ScenarioConfig::builtin_demo(), output_path, verbose_level)
    } else if let Some(scenario_path) = matches.get_one::<String>("scenario") {
        run_scenario(scenario_path, matches.get_flag("info"), output_path, verbose_level)
    } else {
        show_default_help();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("エラー: {}", e);
        std::process::exit(1);
    }
}

/// シナリオファイルを読み込んで実行
fn run_scenario(
    scenario_path: &str,
    info_only: bool,
    output_path: Option<&str>,
    verbose_level: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = ScenarioConfig::from_file(scenario_path)?;

    if verbose_level > 0 {
        println!("シナリオファイル読み込み完了: {}", scenario_path);
    }

    if info_only {
        scenario.print_summary();
        return Ok(());
    }

    execute_scenario(scenario, output_path, verbose_level)
}

/// シナリオの実行
fn execute_scenario(
    scenario: ScenarioConfig,
    output_path: Option<&str>,
    verbose_level: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    scenario.print_summary();
    println!();

    let output_path = output_path
        .map(PathBuf::from)
        .or_else(|| scenario.output.as_ref().map(|o| o.path.clone()));

    let mut engine = SimulationEngine::new(scenario, verbose_level)?;

    let mut sink: Box<dyn PoseSink> = match &output_path {
        Some(path) => {
            println!("姿勢出力先: {}", path.display());
            Box::new(JsonLinesSink::create(path)?)
        }
        None => Box::new(NullSink),
    };

    let summary = engine.run(sink.as_mut())?;
    print_run_summary(&summary);

    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!();
    println!("=== 実行結果 ===");
    println!("シミュレーション時間: {:.2}秒", summary.sim_time);
    println!("総ステップ数: {} (フレーム数: {})", summary.steps, summary.frames);
    println!("最終姿勢:");
    for pose in &summary.final_poses {
        println!(
            "  #{} {:?}: ({:.3}, {:.3}) 方位 {:.1}°",
            pose.index,
            pose.kind,
            pose.x,
            pose.y,
            pose.theta.to_degrees()
        );
    }
}

/// デフォルトヘルプとシナリオ一覧を表示
fn show_default_help() {
    println!("使用方法:");
    println!("  trailersim [オプション]");
    println!();
    println!("オプション:");
    println!("  -s, --scenario <FILE>  シナリオファイルを指定して実行");
    println!("  -i, --info             シナリオ情報のみ表示");
    println!("  -t, --test             組み込みデモシナリオを実行");
    println!("  -o, --output <FILE>    姿勢を JSON Lines で出力");
    println!("  -v, --verbose          詳細出力 (複数指定で詳細レベル上昇)");
    println!("  -h, --help             このヘルプを表示");
    println!();
    println!("利用可能なシナリオファイル:");
    println!("  scenarios/figure_eight.yaml    - 8の字ヒステリシス操舵");
    println!("  scenarios/bounding_box.yaml    - 領域指定操舵");
    println!("  scenarios/manual_append.yaml   - 手動操舵とトレーラー追加・削除");
    println!();
    println!("例:");
    println!("  trailersim -s scenarios/figure_eight.yaml");
    println!("  trailersim -s scenarios/bounding_box.yaml -v -o out/poses.jsonl");
    println!("  trailersim -s scenarios/manual_append.yaml -i");
    println!("  trailersim --test");
}
