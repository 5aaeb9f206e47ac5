//! CLI commands for ridgeline-route

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::formats::GraphFile;
use crate::router::{Algorithm, RequestHints, RouteRequest};

#[derive(Parser)]
#[command(name = "ridgeline-route")]
#[command(about = "Road routing with contraction hierarchies and landmarks", long_about = None)]
pub struct Cli {
    /// Log as JSON lines instead of text
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load or prepare the location index and every CH/LM profile
    Prepare {
        /// Graph file written by the importer
        #[arg(long)]
        graph: PathBuf,

        /// Engine configuration (TOML)
        #[arg(long)]
        config: PathBuf,

        /// Directory holding the prepared files
        #[arg(long)]
        dir: PathBuf,
    },

    /// Route through two or more points
    Route {
        #[arg(long)]
        graph: PathBuf,

        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        dir: PathBuf,

        /// Request point as lat,lon; repeat for every point in order
        #[arg(long = "point", value_parser = parse_coord, required = true, num_args = 1)]
        points: Vec<(f64, f64)>,

        #[arg(long)]
        profile: String,

        #[arg(long)]
        disable_ch: bool,

        #[arg(long)]
        disable_lm: bool,

        #[arg(long, value_enum)]
        algorithm: Option<Algorithm>,

        #[arg(long)]
        max_visited_nodes: Option<usize>,

        /// Override the profile's u-turn cost
        #[arg(long)]
        u_turn_costs: Option<f64>,

        /// Departure time, e.g. 2024-05-01T08:30:00
        #[arg(long)]
        departure: Option<NaiveDateTime>,
    },

    /// Show headers of the prepared files in a directory
    Info {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Remove prepared files so the next start prepares again
    Clean {
        #[arg(long)]
        dir: PathBuf,
    },
}

fn parse_coord(s: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = s
        .split_once(',')
        .ok_or_else(|| "coordinate must be in format 'lat,lon'".to_string())?;
    let lat = lat.trim().parse::<f64>().map_err(|e| format!("latitude: {e}"))?;
    let lon = lon.trim().parse::<f64>().map_err(|e| format!("longitude: {e}"))?;
    Ok((lat, lon))
}

/// Text logs by default, JSON with `--log-json`; `RUST_LOG` overrides the level
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_engine(graph: &Path, config: &Path, dir: &Path) -> Result<Engine> {
    let config = EngineConfig::load(config)?;
    let graph = GraphFile::read(graph)?
        .with_context(|| format!("graph file {} not found", graph.display()))?;
    Ok(Engine::load_or_prepare(Arc::new(graph), config, dir)?)
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Prepare { graph, config, dir } => {
                let start = Instant::now();
                let engine = open_engine(&graph, &config, &dir)?;
                let router = engine.router();
                println!("Prepared {} in {:.1}s", dir.display(), start.elapsed().as_secs_f64());
                println!(
                    "  graph: {} nodes, {} edges",
                    router.graph().node_count(),
                    router.graph().edge_count()
                );
                for ch in &router.config().ch.profiles {
                    if let Some(prepared) = router.ch(&ch.profile) {
                        println!(
                            "  ch.{}: {} arcs, {} shortcuts",
                            ch.profile,
                            prepared.arc_count(),
                            prepared.shortcut_count()
                        );
                    }
                }
                for lm in &router.config().lm.profiles {
                    if let Some(prepared) = router.landmarks(&lm.profile) {
                        println!(
                            "  lm.{}: {} subnetworks, factor {:.3}",
                            lm.profile,
                            prepared.subnetwork_count().saturating_sub(1),
                            prepared.factor()
                        );
                    }
                }
                Ok(())
            }
            Commands::Route {
                graph,
                config,
                dir,
                points,
                profile,
                disable_ch,
                disable_lm,
                algorithm,
                max_visited_nodes,
                u_turn_costs,
                departure,
            } => {
                let engine = open_engine(&graph, &config, &dir)?;
                let request = RouteRequest {
                    profile,
                    points,
                    hints: RequestHints {
                        disable_ch,
                        disable_lm,
                        algorithm,
                        max_visited_nodes,
                        u_turn_costs,
                        departure,
                    },
                };
                let response = engine.router().route(&request)?;
                println!("{}", serde_json::to_string_pretty(&response)?);
                Ok(())
            }
            Commands::Info { dir } => {
                let files = Engine::info(&dir)?;
                if files.is_empty() {
                    println!("No prepared files in {}", dir.display());
                }
                for f in files {
                    println!(
                        "{:<24} {} v{}  profile {}  graph {}  {} bytes",
                        f.name,
                        f.magic,
                        f.version,
                        f.profile_version,
                        &f.graph[..16],
                        f.bytes
                    );
                }
                Ok(())
            }
            Commands::Clean { dir } => {
                let removed = Engine::clean(&dir)?;
                println!("Removed {removed} prepared files from {}", dir.display());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coord() {
        assert_eq!(parse_coord("50.1, 4.2"), Ok((50.1, 4.2)));
        assert!(parse_coord("50.1").is_err());
        assert!(parse_coord("a,4").is_err());
    }

    #[test]
    fn test_route_arguments() {
        let cli = Cli::try_parse_from([
            "ridgeline-route",
            "route",
            "--graph",
            "g.rg",
            "--config",
            "e.toml",
            "--dir",
            "prep",
            "--point",
            "50.0,4.0",
            "--point",
            "50.1,4.1",
            "--profile",
            "car",
            "--algorithm",
            "alt",
        ])
        .unwrap();
        match cli.command {
            Commands::Route { points, algorithm, .. } => {
                assert_eq!(points, vec![(50.0, 4.0), (50.1, 4.1)]);
                assert_eq!(algorithm, Some(Algorithm::Alt));
            }
            _ => panic!("expected route"),
        }
    }
}
