//! CLI commands implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};

use deckbench::backends::deepseek::{DeepSeekMode, DeepSeekStrategy};
use deckbench::backends::glm::GlmMode;
use deckbench::backends::vision::VisionPrompt;
use deckbench::backends::{
    DeepSeekBackend, DirectBackend, EasyOcrBackend, ExtractOptions, ExtractionBackend, GlmBackend, Source,
    VisionBackend,
};
use deckbench::benchmark::{
    BenchmarkDump, BenchmarkHarness, BenchmarkOptions, LocalBenchmark, LocalBenchmarkOptions, PropertyExtractor,
    save_benchmark, save_local_benchmark,
};
use deckbench::core::{OutputFormat, parse_slide_range, render_units, write_units};
use deckbench::invoice::{self, InvoiceProperties};
use deckbench::llm::{LlmClient, Provider};
use deckbench::postprocess::{PostProcessType, post_process_units, write_vector_ready_markdown};
use deckbench::{DeckbenchConfig, ExtractedUnit, ModelContext};

/// Image suffixes treated as image input rather than a document.
const IMAGE_SUFFIXES: [&str; 7] = ["png", "jpg", "jpeg", "tif", "tiff", "webp", "bmp"];

#[derive(Parser)]
#[command(name = "deckbench")]
#[command(about = "Extract slide decks and scans with interchangeable backends and benchmark them")]
#[command(version)]
pub struct Cli {
    /// Configuration file (.toml, .yaml or .json). Default: discover deckbench.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read text, tables and notes straight from PPTX XML
    Direct {
        /// PPTX file
        input: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
        /// Append speaker notes in text output
        #[arg(long)]
        include_notes: bool,
    },

    /// Cloud vision LLM (Claude or GPT) on a document or images
    Vision {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        output: OutputArgs,
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long)]
        model: Option<String>,
        /// slide or invoice
        #[arg(long)]
        prompt_mode: Option<VisionPrompt>,
        #[command(flatten)]
        post: PostProcessArgs,
    },

    /// DeepSeek OCR 2 in a local worker
    Deepseek {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        output: OutputArgs,
        /// Load the model with 4-bit quantization (transformers only)
        #[arg(long)]
        quantize_4bit: bool,
        /// transformers or vllm
        #[arg(long)]
        strategy: Option<DeepSeekStrategy>,
        /// structured, free, figure or describe
        #[arg(long)]
        prompt_mode: Option<DeepSeekMode>,
        #[command(flatten)]
        post: PostProcessArgs,
    },

    /// GLM-OCR behind an OpenAI-compatible endpoint
    Glm {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        output: OutputArgs,
        /// structured, free, figure, describe or invoice
        #[arg(long)]
        prompt_mode: Option<GlmMode>,
        /// Default: GLM_OCR_MODEL or glm-ocr
        #[arg(long)]
        model: Option<String>,
        /// Default: GLM_OCR_BASE_URL
        #[arg(long)]
        base_url: Option<String>,
        /// Default: GLM_OCR_API_KEY or EMPTY
        #[arg(long)]
        api_key: Option<String>,
        #[command(flatten)]
        post: PostProcessArgs,
    },

    /// EasyOCR in a local worker
    Easyocr {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        output: OutputArgs,
        /// Run EasyOCR on the GPU
        #[arg(long)]
        gpu: bool,
        #[command(flatten)]
        post: PostProcessArgs,
    },

    /// Compare several methods on one document or image set
    Benchmark {
        #[command(flatten)]
        input: InputArgs,
        /// Comma-separated methods (direct, vision, deepseek, glm, easyocr)
        #[arg(short, long, value_delimiter = ',')]
        methods: Option<Vec<String>>,
        /// Content kind for image input: slide or invoice
        #[arg(long, default_value = "invoice")]
        prompt_mode: VisionPrompt,
        /// 4-bit quantization for DeepSeek
        #[arg(long)]
        quantize_4bit: bool,
        /// Markdown report path; the JSON dump goes next to it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Local OCR benchmark on handwriting scans and invoice PDFs
    BenchmarkLocal {
        handwriting_dir: PathBuf,
        invoices_dir: PathBuf,
        /// Comma-separated methods (deepseek, easyocr)
        #[arg(short, long, value_delimiter = ',')]
        methods: Option<Vec<String>>,
        #[arg(long)]
        dpi: Option<u32>,
        /// Run DeepSeek at full precision
        #[arg(long)]
        no_quantize: bool,
        /// JSON with expected properties per PDF file name
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        /// llm or heuristic
        #[arg(long)]
        extractor: Option<PropertyExtractor>,
        #[arg(short, long, default_value = "benchmark_local_ocr.md")]
        output: PathBuf,
    },

    /// Extract invoice properties from an OCR text file
    Invoice {
        text_file: PathBuf,
        /// llm or heuristic
        #[arg(long)]
        extractor: Option<PropertyExtractor>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score a properties JSON against ground truth
    Score {
        properties: PathBuf,
        truth: PathBuf,
        /// Entry of a per-file ground-truth JSON; without it the truth file is one flat mapping
        #[arg(long)]
        key: Option<String>,
    },
}

#[derive(Args)]
struct InputArgs {
    /// One document, or one or more images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Slide selection, e.g. 1,3,5-10
    #[arg(long)]
    slides: Option<String>,
    /// Render resolution for documents
    #[arg(long)]
    dpi: Option<u32>,
}

#[derive(Args)]
struct OutputArgs {
    /// Output file. Default: print to stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// json or text
    #[arg(long, default_value = "json")]
    format: OutputFormatArg,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormatArg {
    Json,
    Text,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(value: OutputFormatArg) -> Self {
        match value {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Text => OutputFormat::Text,
        }
    }
}

#[derive(Args)]
struct PostProcessArgs {
    /// Rewrite each unit for a vector database: powerpoint or handwriting
    #[arg(long)]
    post_process: Option<PostProcessType>,
    #[arg(long)]
    llm_provider: Option<Provider>,
    #[arg(long)]
    llm_model: Option<String>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DeckbenchConfig> {
    let mut config = match path {
        Some(path) => DeckbenchConfig::from_file(path)?,
        None => DeckbenchConfig::discover()?.unwrap_or_default(),
    };
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_SUFFIXES.iter().any(|s| s.eq_ignore_ascii_case(e)))
}

/// A single non-image path is a document; anything else is an image list.
fn source_from(inputs: &[PathBuf]) -> anyhow::Result<Source> {
    match inputs {
        [] => bail!("no input given"),
        [single] if !is_image(single) => Ok(Source::Document(single.clone())),
        many => {
            if let Some(doc) = many.iter().find(|p| !is_image(p)) {
                bail!("{} is not an image; pass a single document or only images", doc.display());
            }
            Ok(Source::Images(many.to_vec()))
        }
    }
}

fn extract_options(input: &InputArgs, config: &DeckbenchConfig) -> anyhow::Result<ExtractOptions> {
    let slides = input.slides.as_deref().map(parse_slide_range).transpose()?;
    let options = ExtractOptions {
        render: config.render.clone(),
        ..Default::default()
    }
    .with_slides(slides);
    Ok(match input.dpi {
        Some(dpi) => options.with_dpi(dpi),
        None => options,
    })
}

async fn emit(units: &[ExtractedUnit], output: &OutputArgs, include_notes: bool) -> anyhow::Result<()> {
    let format = OutputFormat::from(output.format);
    match &output.output {
        Some(path) => {
            write_units(units, path, format, include_notes).await?;
            println!("✓ {} units -> {}", units.len(), path.display());
        }
        None => print!("{}", render_units(units, format, include_notes)?),
    }
    Ok(())
}

async fn post_process(
    units: &mut [ExtractedUnit],
    post: &PostProcessArgs,
    output: &OutputArgs,
    config: &DeckbenchConfig,
) -> anyhow::Result<()> {
    let Some(kind) = post.post_process else {
        return Ok(());
    };
    let provider = post.llm_provider.unwrap_or(config.llm.provider);
    let model = post.llm_model.clone().or_else(|| config.llm.model.clone());
    let llm = LlmClient::for_provider(provider, model, &config.llm)?;

    post_process_units(&llm, units, kind).await?;
    if let Some(path) = &output.output {
        let md = write_vector_ready_markdown(units, path).await?;
        println!("✓ Vector-ready Markdown -> {}", md.display());
    }
    Ok(())
}

async fn run_extraction(
    backend: &dyn ExtractionBackend,
    input: &InputArgs,
    output: &OutputArgs,
    post: Option<&PostProcessArgs>,
    config: &DeckbenchConfig,
) -> anyhow::Result<()> {
    let source = source_from(&input.inputs)?;
    let options = extract_options(input, config)?;

    let mut units = backend.extract(&source, &options).await?;
    if let Some(post) = post {
        post_process(&mut units, post, output, config).await?;
    }
    emit(&units, output, false).await
}

fn default_report_path(source: &Source) -> PathBuf {
    match source {
        Source::Document(path) => {
            let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            path.with_file_name(format!("{}_benchmark.md", stem))
        }
        Source::Images(_) => PathBuf::from("benchmark_images.md"),
    }
}

fn print_report(markdown: &Path, json: &Path, report: &str) {
    let rule = "=".repeat(60);
    println!("\n{}", rule);
    println!("{}", report);
    println!("{}", rule);
    println!("\nReport:  {}", markdown.display());
    println!("Daten:   {}", json.display());
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let models = Arc::new(ModelContext::new());

    let result = dispatch(cli.command, config, Arc::clone(&models)).await;
    models.shutdown();
    result
}

async fn dispatch(command: Commands, mut config: DeckbenchConfig, models: Arc<ModelContext>) -> anyhow::Result<()> {
    match command {
        Commands::Direct {
            input,
            output,
            include_notes,
        } => {
            let options = ExtractOptions {
                include_notes,
                ..Default::default()
            };
            let units = DirectBackend.extract(&Source::Document(input), &options).await?;
            emit(&units, &output, include_notes).await
        }

        Commands::Vision {
            input,
            output,
            provider,
            model,
            prompt_mode,
            post,
        } => {
            if let Some(provider) = provider {
                config.vision.provider = provider;
            }
            if model.is_some() {
                config.vision.model = model;
            }
            if let Some(mode) = prompt_mode {
                config.vision.prompt_mode = mode;
            }
            let backend = VisionBackend::from_config(&config.vision, &config.llm)?;
            run_extraction(&backend, &input, &output, Some(&post), &config).await
        }

        Commands::Deepseek {
            input,
            output,
            quantize_4bit,
            strategy,
            prompt_mode,
            post,
        } => {
            if let Some(strategy) = strategy {
                config.deepseek.strategy = strategy;
            }
            if let Some(mode) = prompt_mode {
                config.deepseek.prompt_mode = mode;
            }
            if quantize_4bit {
                config.deepseek.quantize = true;
            }
            let backend = DeepSeekBackend::new(models, &config.deepseek);
            run_extraction(&backend, &input, &output, Some(&post), &config).await
        }

        Commands::Glm {
            input,
            output,
            prompt_mode,
            model,
            base_url,
            api_key,
            post,
        } => {
            if let Some(mode) = prompt_mode {
                config.glm.prompt_mode = mode;
            }
            if let Some(model) = model {
                config.glm.model = model;
            }
            if let Some(url) = base_url {
                config.glm.base_url = url;
            }
            if let Some(key) = api_key {
                config.glm.api_key = key;
            }
            let backend = GlmBackend::new(&config.glm);
            run_extraction(&backend, &input, &output, Some(&post), &config).await
        }

        Commands::Easyocr {
            input,
            output,
            gpu,
            post,
        } => {
            let backend = EasyOcrBackend::new(models, &config.easyocr).with_gpu(gpu || config.easyocr.gpu);
            run_extraction(&backend, &input, &output, Some(&post), &config).await
        }

        Commands::Benchmark {
            input,
            methods,
            prompt_mode,
            quantize_4bit,
            output,
        } => {
            let source = source_from(&input.inputs)?;
            let options = BenchmarkOptions {
                extract: extract_options(&input, &config)?,
                prompt: prompt_mode,
                quantize: quantize_4bit.then_some(true),
            };
            let methods = methods.unwrap_or_else(|| config.benchmark.methods.clone());

            let harness = BenchmarkHarness::with_models(config, models);
            let results = harness.run(&source, &methods, &options).await?;

            let report_path = output.unwrap_or_else(|| default_report_path(&source));
            let dump = BenchmarkDump::new(source.describe(), results);
            let saved = save_benchmark(&dump, &report_path).await?;
            print_report(
                &saved.markdown,
                &saved.json,
                &deckbench::benchmark::format_benchmark_report(&dump.results),
            );
            Ok(())
        }

        Commands::BenchmarkLocal {
            handwriting_dir,
            invoices_dir,
            methods,
            dpi,
            no_quantize,
            ground_truth,
            extractor,
            output,
        } => {
            let mut options = LocalBenchmarkOptions::new(handwriting_dir, invoices_dir, &config);
            if let Some(methods) = methods {
                options.methods = methods;
            }
            if let Some(dpi) = dpi {
                options.dpi = dpi;
            }
            if no_quantize {
                options.quantize = false;
            }
            if let Some(extractor) = extractor {
                options.extractor = extractor;
            }
            options.ground_truth = ground_truth;

            let report = LocalBenchmark::with_models(config, models).run(&options).await?;
            let saved = save_local_benchmark(&report, &output).await?;
            print_report(
                &saved.markdown,
                &saved.json,
                &deckbench::benchmark::format_local_benchmark_report(&report),
            );
            Ok(())
        }

        Commands::Invoice {
            text_file,
            extractor,
            output,
        } => {
            let text = tokio::fs::read_to_string(&text_file)
                .await
                .with_context(|| format!("reading {}", text_file.display()))?;
            let properties = match extractor.unwrap_or(config.benchmark.property_extractor) {
                PropertyExtractor::Heuristic => invoice::extract_heuristic(&text),
                PropertyExtractor::Llm => {
                    let llm = LlmClient::from_config(&config.llm)?;
                    invoice::extract_with_llm(&llm, &text).await?
                }
            };
            tracing::info!(
                "{} of {} properties filled",
                properties.filled_count(),
                deckbench::PROPERTY_KEYS.len()
            );

            let json = serde_json::to_string_pretty(&properties)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    println!("✓ Properties -> {}", path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }

        Commands::Score { properties, truth, key } => {
            let raw = tokio::fs::read_to_string(&properties)
                .await
                .with_context(|| format!("reading {}", properties.display()))?;
            let predicted: InvoiceProperties = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON object", properties.display()))?;

            let expected = match key {
                Some(key) => {
                    let mut all = invoice::load_ground_truth(&truth).await?;
                    all.shift_remove(&key)
                        .with_context(|| format!("no ground truth for '{}' in {}", key, truth.display()))?
                }
                None => {
                    let raw = tokio::fs::read_to_string(&truth)
                        .await
                        .with_context(|| format!("reading {}", truth.display()))?;
                    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON object", truth.display()))?
                }
            };

            let score = invoice::score(&predicted, &expected);
            println!("{}", serde_json::to_string_pretty(&score)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_document_is_document_source() {
        let source = source_from(&[PathBuf::from("deck.pptx")]).unwrap();
        assert_eq!(source, Source::Document("deck.pptx".into()));
    }

    #[test]
    fn test_images_are_image_source() {
        let source = source_from(&[PathBuf::from("a.PNG"), PathBuf::from("b.jpg")]).unwrap();
        assert!(source.is_images());
        assert_eq!(source_from(&[PathBuf::from("scan.tiff")]).unwrap(), Source::Images(vec!["scan.tiff".into()]));
    }

    #[test]
    fn test_mixed_inputs_are_rejected() {
        assert!(source_from(&[PathBuf::from("a.png"), PathBuf::from("deck.pptx")]).is_err());
    }

    #[test]
    fn test_default_report_path() {
        assert_eq!(
            default_report_path(&Source::Document("/in/deck.pptx".into())),
            PathBuf::from("/in/deck_benchmark.md")
        );
        assert_eq!(
            default_report_path(&Source::Images(vec!["a.png".into()])),
            PathBuf::from("benchmark_images.md")
        );
    }

    #[test]
    fn test_parse_benchmark_methods() {
        let cli = Cli::try_parse_from(["deckbench", "benchmark", "a.png", "b.png", "--methods", "deepseek,glm"]).unwrap();
        match cli.command {
            Commands::Benchmark { methods, prompt_mode, .. } => {
                assert_eq!(methods.unwrap(), vec!["deepseek", "glm"]);
                assert_eq!(prompt_mode, VisionPrompt::Invoice);
            }
            _ => panic!("expected benchmark command"),
        }
    }

    #[test]
    fn test_parse_typed_modes() {
        let cli = Cli::try_parse_from(["deckbench", "glm", "scan.png", "--prompt-mode", "invoice"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Glm {
                prompt_mode: Some(GlmMode::Invoice),
                ..
            }
        ));
        assert!(Cli::try_parse_from(["deckbench", "glm", "scan.png", "--prompt-mode", "poem"]).is_err());
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deckbench.toml");
        std::fs::write(&path, "[render]\ndpi = 300\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.render.dpi, 300);
    }
}
