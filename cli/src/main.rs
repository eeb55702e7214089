use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use colored::*;
use log::info;
use std::io::Write;
use std::process;

use zapsentry_core::{
    ConsoleSink, GithubNotifier, GithubSettings, Notifier, OpenAiSummarizer, Phase, PhaseState,
    RiskLevel, RunOutcome, ScanConfig, ScanEventSink, ScanPipeline, ScannerProcess, SinkRef, Summarizer,
    SummarizerSettings, UnconfiguredSummarizer,
};

const EXIT_GATE_FAILED: i32 = 1;
const EXIT_FATAL: i32 = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PhaseArg {
    Spider,
    AjaxSpider,
    Passive,
    Active,
}

#[derive(Parser, Debug)]
#[command(
    name = "zapsentry",
    author = "RealOzk",
    version,
    about = "ZAP scan orchestrator and CI security gate",
    override_usage = "zapsentry <target>  <options>",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Full scan:                      zapsentry http://target.com
  Fail the build on high risk:    zapsentry http://target.com --fail-on-levels high
  Summarize and ignore noise:     zapsentry http://target.com --summarize-levels high,medium --ignore-levels informational
  Launch ZAP ourselves:           zapsentry http://target.com --zap-path /opt/zap/zap.sh
  Launch ZAP found on PATH:       zapsentry http://target.com --launch
  Skip slow phases:               zapsentry http://target.com --skip ajax-spider,active
  From a config file:             zapsentry --config scan.json
  Dry-run test:                   zapsentry http://target.com --dry-run"
)]
pub struct Args {
    #[arg(env = "TARGET_URL", required_unless_present = "config")]
    pub target: Option<String>,

    #[arg(short = 'c', long, help = "JSON config file; command-line options override it")]
    pub config: Option<String>,

    #[arg(long, env = "ZAP_PATH", help = "ZAP launcher to start in daemon mode (omit to attach to a running ZAP)")]
    pub zap_path: Option<String>,

    #[arg(long, env = "ZAP_LAUNCH", help = "Start ZAP even without --zap-path, looking in ./tools and PATH")]
    pub launch: bool,

    #[arg(long, env = "ZAP_HOST", help = "Host of the ZAP API [default: localhost]")]
    pub zap_host: Option<String>,

    #[arg(long, env = "ZAP_PORT", help = "Port of the ZAP API [default: 8080]")]
    pub zap_port: Option<u16>,

    #[arg(long, env = "ZAP_API_KEY", hide_env_values = true, help = "ZAP API key")]
    pub zap_api_key: Option<String>,

    #[arg(long, env = "ZAP_STARTUP_TIMEOUT", help = "Seconds to wait for ZAP to come up [default: 60]")]
    pub startup_timeout: Option<u64>,

    #[arg(long, env = "SKIP_PHASES", value_enum, value_delimiter = ',', help = "Phases to skip")]
    pub skip: Vec<PhaseArg>,

    #[arg(long, env = "SUMMARIZE_LEVELS", help = "Risk levels to summarize (e.g. \"high,medium\")")]
    pub summarize_levels: Option<String>,

    #[arg(long, env = "IGNORE_LEVELS", help = "Risk levels to drop from the report")]
    pub ignore_levels: Option<String>,

    #[arg(long, env = "FAIL_ON_LEVELS", help = "Risk levels that fail the run")]
    pub fail_on_levels: Option<String>,

    #[arg(long, env = "ALERTS_LIMIT", help = "Maximum number of alerts to process [default: 100]")]
    pub alerts_limit: Option<usize>,

    #[arg(long, env = "AJAX_SPIDER_TIMEOUT", help = "AJAX spider time limit in seconds [default: 120]")]
    pub ajax_timeout: Option<u64>,

    #[arg(short = 'o', long, env = "REPORT_PATH", help = "Report file path [default: security_report.txt]")]
    pub output: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, help = "API key for the summarization model")]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", help = "OpenAI-compatible API base URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", help = "Summarization model name")]
    pub openai_model: Option<String>,

    #[arg(long, env = "ALERT_PROMPT", help = "System prompt for per-alert summaries")]
    pub alert_prompt: Option<String>,

    #[arg(long, env = "SUMMARY_PROMPT", help = "System prompt for the final summary")]
    pub summary_prompt: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "Token used to comment on the pull request")]
    pub github_token: Option<String>,

    #[arg(long, env = "GITHUB_REPO", help = "Repository as owner/name")]
    pub github_repo: Option<String>,

    #[arg(long, env = "GITHUB_PR_NUMBER", help = "Pull request number to comment on")]
    pub github_pr_number: Option<u64>,

    #[arg(short = 'v', long, default_value_t = false, help = "Show the whole process (Verbose Mode)")]
    pub verbose: bool,

    #[arg(long, help = "Validate the configuration and print the plan without scanning")]
    pub dry_run: bool,
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    dotenvy::dotenv().ok();
    env_logger::init();

    print_banner();
    let args = Args::parse();

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {:#}", e).red());
            process::exit(EXIT_FATAL);
        }
    };

    if args.dry_run {
        print_plan(&config);
        return;
    }

    let code = match run_scan(&args, &config).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            if outcome.gate.is_failure() { EXIT_GATE_FAILED } else { 0 }
        }
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {:#}", e).red().bold());
            EXIT_FATAL
        }
    };
    process::exit(code);
}

/// Layers the config file, then command-line/environment values, then validates.
fn build_config(args: &Args) -> anyhow::Result<ScanConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };

    if let Some(target) = &args.target {
        config.target = target.clone();
    }
    for phase in &args.skip {
        match phase {
            PhaseArg::Spider => config.phases.spider = false,
            PhaseArg::AjaxSpider => config.phases.ajax_spider = false,
            PhaseArg::Passive => config.phases.passive = false,
            PhaseArg::Active => config.phases.active = false,
        }
    }

    if let Some(raw) = &args.summarize_levels {
        config.summarize_levels = RiskLevel::parse_set(raw)?;
    }
    if let Some(raw) = &args.ignore_levels {
        config.ignore_levels = RiskLevel::parse_set(raw)?;
    }
    if let Some(raw) = &args.fail_on_levels {
        config.fail_on_levels = RiskLevel::parse_set(raw)?;
    }
    if let Some(limit) = args.alerts_limit {
        config.alerts_limit = limit;
    }
    if let Some(timeout) = args.ajax_timeout {
        config.ajax_timeout = timeout;
    }
    if let Some(output) = &args.output {
        config.output = output.clone();
    }

    let scanner = &mut config.scanner;
    if args.zap_path.is_some() {
        scanner.zap_path = args.zap_path.clone();
    }
    scanner.launch |= args.launch;
    if let Some(host) = &args.zap_host {
        scanner.host = host.clone();
    }
    if let Some(port) = args.zap_port {
        scanner.port = port;
    }
    if args.zap_api_key.is_some() {
        scanner.api_key = args.zap_api_key.clone();
    }
    if let Some(timeout) = args.startup_timeout {
        scanner.startup_timeout = timeout;
    }
    config.verbose |= args.verbose;

    config.validate()?;
    if !config.summarize_levels.is_empty() && openai_key(args).is_none() {
        bail!("Configuration error: summarize levels are set but OPENAI_API_KEY is missing");
    }
    Ok(config)
}

fn openai_key(args: &Args) -> Option<&str> {
    args.openai_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
}

fn build_summarizer(args: &Args) -> anyhow::Result<Box<dyn Summarizer>> {
    let Some(key) = openai_key(args) else {
        return Ok(Box::new(UnconfiguredSummarizer));
    };

    let mut settings = SummarizerSettings::new(key);
    if let Some(base) = &args.openai_base_url {
        settings.base_url = base.clone();
    }
    if let Some(model) = &args.openai_model {
        settings.model = model.clone();
    }
    settings.alert_prompt = args.alert_prompt.clone();
    settings.summary_prompt = args.summary_prompt.clone();

    let summarizer = OpenAiSummarizer::new(settings).context("Failed to build summarization client")?;
    Ok(Box::new(summarizer))
}

/// The notifier is only built when token, repository and PR number are all known.
fn build_notifier(args: &Args, sink: &SinkRef) -> Option<GithubNotifier> {
    match (&args.github_token, &args.github_repo, args.github_pr_number) {
        (Some(token), Some(repo), Some(pr)) => {
            Some(GithubNotifier::new(GithubSettings::new(token.clone(), repo.clone(), pr)))
        }
        (None, None, None) => None,
        _ => {
            sink.on_log(
                "warn",
                "[!] GITHUB_TOKEN, GITHUB_REPO and GITHUB_PR_NUMBER are all required to post a comment; skipping.",
            );
            None
        }
    }
}

/// Brings the scanner up, runs the pipeline, and always releases the scanner.
async fn run_scan(args: &Args, config: &ScanConfig) -> anyhow::Result<RunOutcome> {
    let sink = ConsoleSink::new_ref(config.verbose);
    let summarizer = build_summarizer(args)?;
    let notifier = build_notifier(args, &sink);

    print_scan_config(config);

    let mut scanner = ScannerProcess::launch(&config.scanner, sink.clone()).await?;
    info!("Scanner ready at {} (managed: {})", scanner.client().base_url(), scanner.is_managed());

    let mut pipeline = ScanPipeline::new(config, scanner.client(), summarizer.as_ref(), sink.clone());
    if let Some(notifier) = notifier.as_ref() {
        pipeline = pipeline.with_notifier(notifier as &dyn Notifier);
    }
    let result = pipeline.run().await;

    scanner.stop().await;
    Ok(result?)
}

/// Prints the zapsentry ASCII banner.
fn print_banner() {
    let banner = r#"
     _____   _    ____  ____             _
    |__  /  / \  |  _ \/ ___|  ___ _ __ | |_ _ __ _   _
      / /  / _ \ | |_) \___ \ / _ \ '_ \| __| '__| | | |
     / /_ / ___ \|  __/ ___) |  __/ | | | |_| |  | |_| |
    /____/_/   \_\_|   |____/ \___|_| |_|\__|_|   \__, |
                                                  |___/
    "#;
    print!("{}\r\n", banner.bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

fn levels(set: &std::collections::BTreeSet<RiskLevel>) -> String {
    if set.is_empty() {
        return "none".to_string();
    }
    set.iter().map(|l| l.to_string()).collect::<Vec<_>>().join(", ")
}

fn print_plan(config: &ScanConfig) {
    println!("[DRY RUN] Would scan target: {}", config.target.trim());
    let phases: Vec<String> = config.phases.enabled().iter().map(Phase::to_string).collect();
    println!("[DRY RUN] Phases: {}", phases.join(" -> "));
    println!("[DRY RUN] Summarize: {}", levels(&config.summarize_levels));
    println!("[DRY RUN] Ignore: {}", levels(&config.ignore_levels));
    println!("[DRY RUN] Fail on: {}", levels(&config.fail_on_levels));
    println!("[DRY RUN] Alerts limit: {}", config.alerts_limit);
    println!("[DRY RUN] Report: {}", config.output);
    let scanner = &config.scanner;
    match scanner.zap_path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => println!("[DRY RUN] Scanner: launch {} at {}", path, scanner.base_url()),
        None if scanner.launch => println!("[DRY RUN] Scanner: launch discovered ZAP at {}", scanner.base_url()),
        None => println!("[DRY RUN] Scanner: attach to {}", scanner.base_url()),
    }
}

fn print_scan_config(config: &ScanConfig) {
    let label = |s: &str| format!("{:<14}", s).bright_white().bold();
    print!("{} {}\r\n", label("Target:"), config.target.trim().green());
    print!("{} {}\r\n", label("Scanner:"), config.scanner.base_url());
    print!("{} {}\r\n", label("Fail on:"), levels(&config.fail_on_levels));
    print!("{} {}\r\n", label("Alerts limit:"), config.alerts_limit);
    print!("{} {}\r\n", label("Report:"), config.output);
    std::io::stdout().flush().ok();
}

fn print_outcome(outcome: &RunOutcome) {
    print!("\r\n{}\r\n", "━━━ Scan Summary ━━━".bright_white().bold());
    for (phase, state) in &outcome.phases {
        let state_text = match state {
            PhaseState::Completed => state.to_string().green(),
            PhaseState::TimedOut => state.to_string().yellow(),
            _ => state.to_string().dimmed(),
        };
        print!("  {:<14} {}\r\n", phase.to_string(), state_text);
    }
    for (level, count) in &outcome.report.histogram {
        print!("  {:<14} {}\r\n", format!("{}:", level), count);
    }

    if outcome.gate.is_failure() {
        print!(
            "{}\r\n",
            format!("[!] Security gate FAILED: {} alert(s) at fail-on levels", outcome.report.fail_count)
                .red()
                .bold()
        );
    } else {
        print!("{}\r\n", "[+] Security gate passed.".green().bold());
    }
    std::io::stdout().flush().ok();
}
