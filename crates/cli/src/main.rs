use clap::{Parser, Subcommand};
use lims_core::breakpoints::{BreakpointStandard, TestMethod};
use lims_core::config::{auto_validate_from_env_value, override_policy_from_env_value};
use lims_core::repositories::YamlTable;
use lims_core::rules::{parse_condition, ExpertRule, ExpertRuleService};
use lims_core::{CoreConfig, InterpretationRequest, InterpretationService};
use lims_types::{DrugId, MicroorganismId, RuleId};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "lims")]
#[command(about = "Antimicrobial susceptibility interpretation CLI")]
struct Cli {
    /// Data directory holding breakpoints/ and expert_rules/
    #[arg(long, env = "LIMS_DATA_DIR", default_value = "lims_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interpret a measurement and run the expert rules
    Interpret {
        /// Microorganism id
        microorganism: String,
        /// Drug id
        drug: String,
        /// Test method (disk or mic)
        method: String,
        /// Zone diameter in mm or MIC in µg/mL
        value: f64,
        /// Guideline year (default: latest)
        #[arg(long)]
        year: Option<i32>,
    },
    /// Show the latest active breakpoint standard
    Latest {
        /// Microorganism id
        microorganism: String,
        /// Drug id
        drug: String,
        /// Test method (optional)
        #[arg(long)]
        method: Option<String>,
    },
    /// Show year-over-year breakpoint changes
    Compare {
        /// Microorganism id
        microorganism: String,
        /// Drug id
        drug: String,
        /// Test method (optional)
        #[arg(long)]
        method: Option<String>,
    },
    /// List expert rules
    Rules {
        /// Include retired rules
        #[arg(long)]
        all: bool,
    },
    /// Parse a rule condition and print its canonical form
    CheckCondition {
        /// Condition source
        condition: String,
    },
    /// Retire an expert rule
    RetireRule {
        /// Rule id
        id: String,
    },
}

struct Stores {
    interpretation: InterpretationService,
    rules: ExpertRuleService,
}

fn open_stores(data_dir: PathBuf) -> Result<Stores, Box<dyn std::error::Error>> {
    let cfg = Arc::new(CoreConfig::new(
        data_dir,
        override_policy_from_env_value(std::env::var("LIMS_OVERRIDE_RULE_TYPES").ok())?,
        auto_validate_from_env_value(std::env::var("LIMS_AUTO_VALIDATE").ok())?,
    )?);
    let standards: Arc<YamlTable<BreakpointStandard>> = Arc::new(YamlTable::open(cfg.data_dir())?);
    let rules: Arc<YamlTable<ExpertRule>> = Arc::new(YamlTable::open(cfg.data_dir())?);

    Ok(Stores {
        interpretation: InterpretationService::new(cfg, standards, rules.clone()),
        rules: ExpertRuleService::new(rules),
    })
}

fn parse_method(method: Option<String>) -> Result<Option<TestMethod>, String> {
    method.map(|m| m.parse::<TestMethod>()).transpose()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Interpret {
            microorganism,
            drug,
            method,
            value,
            year,
        }) => {
            let stores = open_stores(cli.data_dir)?;
            let request = InterpretationRequest {
                microorganism_id: MicroorganismId::parse(&microorganism)?,
                drug_id: DrugId::parse(&drug)?,
                test_method: method.parse::<TestMethod>()?,
                test_value: value,
                year,
            };
            match stores.interpretation.interpret_and_validate(&request) {
                Ok(Some(outcome)) => {
                    println!(
                        "Result: {} (breakpoint: {}, confidence: {})",
                        outcome.final_result, outcome.raw_result, outcome.confidence
                    );
                    println!("Standard: {}", outcome.breakpoint_used);
                    println!("Status: {}", outcome.status_hint);
                    for rule in &outcome.validation.triggered_rules {
                        println!(
                            "Rule: {} [{}] priority {} ({} confidence)",
                            rule.rule_name, rule.rule_type, rule.priority, rule.confidence
                        );
                    }
                    for issue in &outcome.validation.errors {
                        println!("Error: {}", issue.message);
                    }
                    if !outcome.comments.is_empty() {
                        println!("Notes: {}", outcome.comments);
                    }
                }
                Ok(None) => println!("No applicable breakpoint standard."),
                Err(e) => eprintln!("Error interpreting measurement: {}", e),
            }
        }
        Some(Commands::Latest {
            microorganism,
            drug,
            method,
        }) => {
            let stores = open_stores(cli.data_dir)?;
            let microorganism_id = MicroorganismId::parse(&microorganism)?;
            let drug_id = DrugId::parse(&drug)?;
            match stores.interpretation.breakpoints().latest(
                &microorganism_id,
                &drug_id,
                parse_method(method)?,
            ) {
                Ok(Some(standard)) => {
                    println!("{}", standard.reference());
                    for (name, value) in [
                        ("susceptible_min", standard.bounds.susceptible_min),
                        ("susceptible_max", standard.bounds.susceptible_max),
                        ("intermediate_min", standard.bounds.intermediate_min),
                        ("intermediate_max", standard.bounds.intermediate_max),
                        ("resistant_min", standard.bounds.resistant_min),
                        ("resistant_max", standard.bounds.resistant_max),
                    ] {
                        if let Some(value) = value {
                            println!("  {name}: {value}");
                        }
                    }
                    if let Some(notes) = &standard.notes {
                        println!("  notes: {notes}");
                    }
                }
                Ok(None) => println!("No applicable breakpoint standard."),
                Err(e) => eprintln!("Error reading breakpoints: {}", e),
            }
        }
        Some(Commands::Compare {
            microorganism,
            drug,
            method,
        }) => {
            let stores = open_stores(cli.data_dir)?;
            let microorganism_id = MicroorganismId::parse(&microorganism)?;
            let drug_id = DrugId::parse(&drug)?;
            match stores.interpretation.breakpoints().compare(
                &microorganism_id,
                &drug_id,
                parse_method(method)?,
            ) {
                Ok(changes) if changes.is_empty() => println!("No changes found."),
                Ok(changes) => {
                    for change in changes {
                        println!("[{}] {}", change.method, change.description);
                    }
                }
                Err(e) => eprintln!("Error comparing breakpoints: {}", e),
            }
        }
        Some(Commands::Rules { all }) => {
            let stores = open_stores(cli.data_dir)?;
            match stores.rules.list(all) {
                Ok(rules) if rules.is_empty() => println!("No expert rules found."),
                Ok(mut rules) => {
                    rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
                    for rule in rules {
                        println!(
                            "ID: {}, Name: {}, Type: {}, Priority: {}, Status: {}",
                            rule.id, rule.name, rule.rule_type, rule.priority, rule.lifecycle
                        );
                        println!("  when {}", rule.condition);
                    }
                }
                Err(e) => eprintln!("Error listing expert rules: {}", e),
            }
        }
        Some(Commands::CheckCondition { condition }) => match parse_condition(&condition) {
            Ok(parsed) => println!("OK: {}", parsed),
            Err(e) => eprintln!("Invalid condition: {}", e),
        },
        Some(Commands::RetireRule { id }) => {
            let stores = open_stores(cli.data_dir)?;
            let id = RuleId::parse(&id)?;
            match stores.rules.retire(&id) {
                Ok(rule) => println!("Retired expert rule: {}", rule.id),
                Err(e) => eprintln!("Error retiring expert rule: {}", e),
            }
        }
        None => {
            println!("Use 'lims --help' for commands");
        }
    }

    Ok(())
}
