use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use conv_sparsity::core::transform::save_snapshots;
use conv_sparsity::{export_statistics, instrument, InstrumentConfig, ModelSpec, SparsityReport, WeightLoader};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array4;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use std::time::Instant;

fn main() {
    env_logger::init();

    let matches = Command::new("Sparsity CLI")
        .version("0.1.0")
        .about("컨볼루션 입력 패치 희소성 프로파일러")
        .subcommand(
            Command::new("profile")
                .about("모델을 계측하고 무작위 ReLU 입력으로 희소성 통계 수집")
                .arg(
                    Arg::new("model-spec")
                        .long("model-spec")
                        .short('m')
                        .value_name("JSON")
                        .help("모델 명세 JSON (없으면 데모 CNN)")
                )
                .arg(
                    Arg::new("weights")
                        .long("weights")
                        .short('w')
                        .value_name("FILE")
                        .help("safetensors 가중치 파일 (없으면 시드 기반 무작위 초기화)")
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("JSON")
                        .help("계측 설정 JSON")
                )
                .arg(
                    Arg::new("batches")
                        .long("batches")
                        .short('n')
                        .value_name("COUNT")
                        .help("forward 배치 수")
                        .default_value("10")
                )
                .arg(
                    Arg::new("batch-size")
                        .long("batch-size")
                        .short('b')
                        .value_name("SIZE")
                        .help("배치 크기")
                        .default_value("4")
                )
                .arg(
                    Arg::new("height")
                        .long("height")
                        .value_name("PIXELS")
                        .help("입력 높이")
                        .default_value("28")
                )
                .arg(
                    Arg::new("width")
                        .long("width")
                        .value_name("PIXELS")
                        .help("입력 너비")
                        .default_value("28")
                )
                .arg(
                    Arg::new("ma-window")
                        .long("ma-window")
                        .value_name("WINDOW")
                        .help("이동 평균 윈도우 크기")
                )
                .arg(
                    Arg::new("group-size")
                        .long("group-size")
                        .value_name("CHANNELS")
                        .help("입력 희소성 채널 묶음 크기 (지정 시 입력 희소성 추적)")
                )
                .arg(
                    Arg::new("tile-factor")
                        .long("tile-factor")
                        .value_name("T")
                        .help("선호 타일 인자")
                )
                .arg(
                    Arg::new("reference")
                        .long("reference")
                        .action(ArgAction::SetTrue)
                        .help("패치 재구성을 직접 컨볼루션과 비교")
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_name("SEED")
                        .help("입력 생성 시드")
                        .default_value("0")
                )
                .arg(
                    Arg::new("model-name")
                        .long("model-name")
                        .value_name("NAME")
                        .help("출력 파일 접두어 (기본: 명세의 모델 이름)")
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .value_name("DIR")
                        .help("통계 출력 디렉토리")
                        .default_value("./sparsity_stats")
                )
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .value_name("FILE")
                        .help("누적기 상태를 bincode로 저장")
                )
        )
        .subcommand(
            Command::new("report")
                .about("저장된 요약 JSON 출력")
                .arg(
                    Arg::new("summary")
                        .required(true)
                        .help("{model}_sparsity_summary.json 경로")
                )
        )
        .subcommand(
            Command::new("inspect")
                .about("safetensors 가중치 파일의 텐서 목록")
                .arg(
                    Arg::new("weights")
                        .required(true)
                        .help("safetensors 파일 경로")
                )
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("profile", sub_matches)) => handle_profile(sub_matches),
        Some(("report", sub_matches)) => handle_report(sub_matches),
        Some(("inspect", sub_matches)) => handle_inspect(sub_matches),
        _ => {
            println!("❌ 명령을 지정해주세요. --help를 참조하세요.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ 오류: {:#}", e);
        process::exit(1);
    }
}

fn parse_arg<T>(matches: &ArgMatches, id: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .get_one::<String>(id)
        .map(|value| value.parse::<T>().with_context(|| format!("--{} 값 오류: {}", id, value)))
        .transpose()
}

fn required_arg<T>(matches: &ArgMatches, id: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_arg(matches, id)?.with_context(|| format!("--{} 필요", id))
}

fn handle_profile(matches: &ArgMatches) -> Result<()> {
    let spec = match parse_arg::<PathBuf>(matches, "model-spec")? {
        Some(path) => ModelSpec::from_json_file(path)?,
        None => ModelSpec::demo(),
    };
    let loader = parse_arg::<PathBuf>(matches, "weights")?
        .map(WeightLoader::open)
        .transpose()?;
    let model_name = parse_arg::<String>(matches, "model-name")?.unwrap_or_else(|| spec.name.clone());

    let mut config = match parse_arg::<PathBuf>(matches, "config")? {
        Some(path) => InstrumentConfig::from_json_file(path)?,
        None => InstrumentConfig::default(),
    };
    if let Some(window) = parse_arg::<usize>(matches, "ma-window")? {
        config = config.with_moving_average(window);
    }
    if let Some(group_size) = parse_arg::<usize>(matches, "group-size")? {
        config = config.with_input_sparsity(Some(group_size));
    }
    if let Some(tile_factor) = parse_arg::<usize>(matches, "tile-factor")? {
        config = config.with_tile_factor(tile_factor);
    }
    if matches.get_flag("reference") {
        config = config.with_reference_check(true);
    }

    let batches: usize = required_arg(matches, "batches")?;
    let batch_size: usize = required_arg(matches, "batch-size")?;
    let height: usize = required_arg(matches, "height")?;
    let width: usize = required_arg(matches, "width")?;
    let seed: u64 = required_arg(matches, "seed")?;
    let output: PathBuf = required_arg(matches, "output")?;

    let Some(channels) = spec.input_channels() else {
        bail!("모델 '{}'에 컨볼루션 레이어가 없음", spec.name);
    };

    println!("🔬 희소성 프로파일링 시작:");
    println!("   모델: {} (레이어 {}개)", model_name, spec.layers.len());
    println!("   입력: {} 배치 × [{}, {}, {}, {}]", batches, batch_size, channels, height, width);
    println!("   이동 평균 윈도우: {:?}", config.moving_average_window);
    println!("   타일 인자: {}", config.tile_factor);

    let mut model = spec.build(loader.as_ref())?;
    instrument(&mut model, &config)?;

    let progress = ProgressBar::new(batches as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("🔬 관측: [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let start = Instant::now();
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..batches {
        let input = Array4::from_shape_fn((batch_size, channels, height, width), |_| {
            rng.gen_range(-1.0f32..1.0).max(0.0)
        });
        model.forward(input.view())?;
        progress.inc(1);
    }
    progress.finish_with_message("완료");
    println!("⏱️ 관측 시간: {:.2}초", start.elapsed().as_secs_f64());

    SparsityReport::from_model(&model, &model_name).print_report();

    let written = export_statistics(&model, &model_name, &output)?;
    println!("\n💾 통계 파일 {}개 저장: {}", written.len(), output.display());

    if let Some(path) = parse_arg::<PathBuf>(matches, "snapshot")? {
        let saved = save_snapshots(&model, &path)?;
        println!("💾 레이어 스냅샷 {}개 저장: {}", saved, path.display());
    }
    Ok(())
}

fn handle_report(matches: &ArgMatches) -> Result<()> {
    let path: PathBuf = required_arg(matches, "summary")?;
    SparsityReport::load_json(&path)?.print_report();
    Ok(())
}

fn handle_inspect(matches: &ArgMatches) -> Result<()> {
    let path: PathBuf = required_arg(matches, "weights")?;
    let loader = WeightLoader::open(&path)?;

    println!("📋 {}", loader.path().display());
    for name in loader.names()? {
        let tensor = loader.tensor_f32(&name)?;
        println!("   {:<32} {:?}", name, tensor.shape());
    }
    Ok(())
}
