//! opgraph - evaluates a demo scene or a saved document
//!
//! Usage: `opgraph [--load <file>] [--save <file>] [--frame <n>]`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use log::{error, info, warn};

use opgraph::error::GraphError;
use opgraph::evaluation::{Document, EditingContext, LogReporter};
use opgraph::nodes::{builtin_registry, Graph, NodeId, ParamValue};
use opgraph::operators::ObjectOperator;
use opgraph::point3d::PointGraphOperator;
use opgraph::{EngineConfig, Evaluator, FileManager};

#[derive(Debug, Default)]
struct Options {
    load: Option<PathBuf>,
    save: Option<PathBuf>,
    frame: Option<i32>,
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = || args.next().ok_or_else(|| format!("{} needs a value", arg));
        match arg.as_str() {
            "--load" => options.load = Some(PathBuf::from(value()?)),
            "--save" => options.save = Some(PathBuf::from(value()?)),
            "--frame" => {
                let frame = value()?;
                options.frame = Some(frame.parse().map_err(|_| format!("invalid frame '{}'", frame))?);
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
    }
    Ok(options)
}

fn create(graph: &mut Graph, node_type: &str) -> Result<NodeId, String> {
    builtin_registry()
        .create_node(node_type)
        .map(|node| graph.add_node(node))
        .ok_or_else(|| format!("unknown node type '{}'", node_type))
}

/// Entry -> noise -> add -> exit: lifts every point by fractal noise
fn noise_displacement() -> Result<Graph, String> {
    let mut graph = Graph::new();
    let entry = create(&mut graph, "point.entry")?;
    let noise = create(&mut graph, "point.noise")?;
    let scale = create(&mut graph, "point.vector")?;
    let multiply = create(&mut graph, "point.math")?;
    let add = create(&mut graph, "point.math")?;
    let exit = create(&mut graph, "point.exit")?;

    let wire = |graph: &mut Graph, from: NodeId, to: NodeId, port: usize| -> Result<(), String> {
        graph.connect_ports(from, 0, to, port).map_err(|e: GraphError| e.to_string())
    };
    wire(&mut graph, entry, noise, 0)?;
    wire(&mut graph, noise, multiply, 0)?;
    wire(&mut graph, scale, multiply, 1)?;
    wire(&mut graph, entry, add, 0)?;
    wire(&mut graph, multiply, add, 1)?;
    wire(&mut graph, add, exit, 0)?;

    let set = |graph: &mut Graph, node: NodeId, name: &str, value: ParamValue| {
        graph.set_parameter(node, name, value).map_err(|e| e.to_string())
    };
    set(&mut graph, noise, "dimension", ParamValue::Int(1))?;
    set(&mut graph, noise, "frequency", ParamValue::Vector(glam::Vec3::splat(2.0)))?;
    set(&mut graph, scale, "value", ParamValue::Vector(glam::Vec3::new(0.0, 0.25, 0.0)))?;
    set(&mut graph, multiply, "operation", ParamValue::Text("multiply".into()))?;
    Ok(graph)
}

fn demo_document() -> Result<Document, String> {
    let mut document = Document::new();

    let mut geometry = Graph::new();
    let grid = create(&mut geometry, "geometry.point_grid")?;
    let point_graph = geometry.add("Displace", Box::new(PointGraphOperator::with_graph(noise_displacement()?)));
    let output = create(&mut geometry, "geometry.object_output")?;
    geometry
        .set_parameter(grid, "columns", ParamValue::Int(64))
        .and_then(|_| geometry.set_parameter(grid, "rows", ParamValue::Int(64)))
        .and_then(|_| geometry.connect_ports(grid, 0, point_graph, 0))
        .and_then(|_| geometry.connect_ports(point_graph, 0, output, 0))
        .map_err(|e| e.to_string())?;
    geometry.output_node = Some(output);
    let terrain = document.scene.add("Terrain", Box::new(ObjectOperator::with_graph(geometry)));
    document.scene.active_node = Some(terrain);

    let solid = create(&mut document.composite, "compositing.solid_color")?;
    let gain = create(&mut document.composite, "compositing.gain")?;
    let viewer = create(&mut document.composite, "compositing.viewer")?;
    let composite = &mut document.composite;
    composite
        .set_parameter(gain, "gain", ParamValue::Float(0.8))
        .and_then(|_| composite.connect_ports(solid, 0, gain, 0))
        .and_then(|_| composite.connect_ports(gain, 0, viewer, 0))
        .map_err(|e| e.to_string())?;

    Ok(document)
}

fn run(options: Options) -> Result<(), String> {
    let config = EngineConfig::load();
    let mut files = FileManager::new();
    let mut document = match &options.load {
        Some(path) => files
            .load_from_file(path, builtin_registry())
            .map_err(|e| format!("loading {}: {}", path.display(), e))?,
        None => demo_document()?,
    };
    if let Some(frame) = options.frame {
        document.set_frame(frame);
    }

    let evaluator = Evaluator::new(document, Arc::new(LogReporter), config);
    info!("Session {}", evaluator.session());

    for context in [EditingContext::Scene, EditingContext::Composite] {
        evaluator
            .with_document(|document| document.context = context)
            .map_err(|e| e.to_string())?;
        let report = evaluator
            .evaluate_now(&format!("Evaluating {:?}", context))
            .map_err(|e| e.to_string())?;
        for (node, message) in &report.warnings {
            warn!("{}: {}", node, message);
        }
        match &report.result {
            Ok(()) => info!("{:?}: executed {:?}", context, report.executed),
            Err(e) => warn!("{:?}: {}", context, e),
        }
    }

    evaluator
        .with_document(|document| {
            if let Some(scene) = &document.last_scene {
                for object in &scene.objects {
                    match object.points.bounds() {
                        Some((min, max)) => info!(
                            "Object '{}': {} points, bounds {} .. {}",
                            object.name,
                            object.points.len(),
                            min,
                            max
                        ),
                        None => info!("Object '{}' is empty", object.name),
                    }
                }
            }
            if let Some(image) = &document.last_image {
                info!("Image {}x{}, first pixel {:?}", image.width, image.height, image.pixel(0, 0));
            }
        })
        .map_err(|e| e.to_string())?;

    if let Some(path) = &options.save {
        let document = evaluator.document();
        let document = document.lock().map_err(|_| "document lock poisoned".to_string())?;
        files
            .save_to_file(path, &document)
            .map_err(|e| format!("saving {}: {}", path.display(), e))?;
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let result = parse_options().and_then(run);
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
