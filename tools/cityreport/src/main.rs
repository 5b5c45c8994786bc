/// Report tool: build a city from CLI parameters and print a JSON summary.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use burgen_core::{Blueprint, City};

#[derive(Parser, Debug)]
#[command(name = "cityreport", about = "Generate a city and print a JSON summary")]
struct Args {
    /// Number of patches inside the city.
    #[arg(long, default_value_t = 15)]
    size: i32,
    /// Random seed; the same seed always yields the same city.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    #[arg(long)]
    citadel: bool,
    #[arg(long)]
    urban_castle: bool,
    /// Skip the curtain wall.
    #[arg(long)]
    no_walls: bool,
    #[arg(long)]
    river: bool,
    #[arg(long)]
    coast: bool,
    #[arg(long)]
    temple: bool,
    /// Skip the central plaza.
    #[arg(long)]
    no_plaza: bool,
    #[arg(long)]
    shantytown: bool,
    #[arg(long)]
    green: bool,
    #[arg(long)]
    hub: bool,
    /// Gate count; -1 derives it from the size.
    #[arg(long, default_value_t = -1)]
    gates: i32,
    #[arg(long)]
    name: Option<String>,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct DistrictRow {
    kind: &'static str,
    cells: usize,
}

#[derive(Serialize)]
struct Summary {
    name: Option<String>,
    cells: usize,
    urban_cells: usize,
    water_cells: usize,
    districts: Vec<DistrictRow>,
    gates: usize,
    wall_closed: Option<bool>,
    canals: usize,
    canal_width: f64,
    arteries: usize,
    buildings: usize,
    landmarks: usize,
    viewport: [f64; 4],
}

fn main() -> Result<()> {
    let args = Args::parse();
    let blueprint = Blueprint {
        size: args.size,
        seed: args.seed,
        citadel: args.citadel,
        urban_castle: args.urban_castle,
        walls: !args.no_walls,
        river: args.river,
        coast: args.coast,
        temple: args.temple,
        plaza: !args.no_plaza,
        shantytown: args.shantytown,
        green: args.green,
        hub: args.hub,
        gates: args.gates,
        name: args.name,
    };

    let city = City::build(blueprint)?;
    let viewport = city.get_viewport();
    let summary = Summary {
        name: city.blueprint().name.clone(),
        cells: city.cells().len(),
        urban_cells: city.cells().iter().filter(|c| c.within_city).count(),
        water_cells: city.cells().iter().filter(|c| c.water).count(),
        districts: city
            .districts()
            .iter()
            .map(|d| DistrictRow { kind: d.kind.label(), cells: d.cells.len() })
            .collect(),
        gates: city.gates().len(),
        wall_closed: city.walls().map(|w| w.is_closed(city.partition())),
        canals: city.canals().len(),
        canal_width: city.canal_width(),
        arteries: city.arteries().len(),
        buildings: city.count_buildings(),
        landmarks: city.landmarks().len(),
        viewport: [viewport.x, viewport.y, viewport.w, viewport.h],
    };

    let json = if args.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{json}");
    Ok(())
}
