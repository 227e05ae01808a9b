use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;

use crate::{
    datatypes::{ConversionTotals, Element, Node, SolverParams},
    error::ApatiteError,
};

/// Node table filename written by the mesher into the output directory
const NODE_TABLE: &str = "nodes.txt";

/// Element table filename written by the mesher into the output directory
const ELEMENT_TABLE: &str = "elems.txt";

/// Parses an integer field from a mesher table
fn parse_int(field: &str, table: &str, line_number: usize) -> Result<usize, ApatiteError> {
    match field.trim().parse() {
        Ok(value) => Ok(value),
        Err(_err) => Err(ApatiteError::Format(format!(
            "{} line {}: invalid integer '{}'",
            table,
            line_number,
            field.trim()
        ))),
    }
}

/// Parses a float field from a mesher table
fn parse_float(field: &str, table: &str, line_number: usize) -> Result<f64, ApatiteError> {
    match field.trim().parse() {
        Ok(value) => Ok(value),
        Err(_err) => Err(ApatiteError::Format(format!(
            "{} line {}: invalid number '{}'",
            table,
            line_number,
            field.trim()
        ))),
    }
}

/// Reads the mesher's node table
///
/// Each line carries a row label, the node id, and the x/y/z coordinates,
/// comma-delimited. Blank lines are skipped; anything else malformed fails
/// the whole run.
///
/// # Arguments
/// * `path` - The path to the node table
///
/// # Returns
/// Nodes in file order
fn read_node_table(path: &Path) -> Result<Vec<Node>, ApatiteError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_err) => {
            return Err(ApatiteError::Io(format!(
                "Unable to open node table {}",
                path.display()
            )))
        }
    };

    let mut nodes = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 1;

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 5 {
            return Err(ApatiteError::Format(format!(
                "{} line {} has {} fields, expected at least 5",
                NODE_TABLE,
                line_number,
                fields.len()
            )));
        }

        // field 0 is a row label with no meaning downstream
        nodes.push(Node {
            id: parse_int(fields[1], NODE_TABLE, line_number)?,
            x: parse_float(fields[2], NODE_TABLE, line_number)?,
            y: parse_float(fields[3], NODE_TABLE, line_number)?,
            z: parse_float(fields[4], NODE_TABLE, line_number)?,
        });
    }

    Ok(nodes)
}

/// Reads the mesher's element table
///
/// Each line carries a row label, the element id, and eight corner node ids,
/// comma-delimited. The embedded element id is discarded; output indices are
/// assigned sequentially at write time.
///
/// # Arguments
/// * `path` - The path to the element table
///
/// # Returns
/// Elements in file order
fn read_element_table(path: &Path) -> Result<Vec<Element>, ApatiteError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_err) => {
            return Err(ApatiteError::Io(format!(
                "Unable to open element table {}",
                path.display()
            )))
        }
    };

    let mut elements = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 1;

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 10 {
            return Err(ApatiteError::Format(format!(
                "{} line {} has {} fields, expected at least 10",
                ELEMENT_TABLE,
                line_number,
                fields.len()
            )));
        }

        let mut connectivity = [0usize; 8];
        for (corner, slot) in connectivity.iter_mut().enumerate() {
            *slot = parse_int(fields[2 + corner], ELEMENT_TABLE, line_number)?;
        }
        elements.push(Element {
            nodes: connectivity,
        });
    }

    Ok(elements)
}

/// Verifies that every element corner references a node present in the node
/// table. Run before any output file is opened so bad meshes never leave
/// partial output behind.
fn check_connectivity(nodes: &[Node], elements: &[Element]) -> Result<(), ApatiteError> {
    let known: HashSet<usize> = nodes.iter().map(|node| node.id).collect();

    for (index, element) in elements.iter().enumerate() {
        for node_id in element.nodes {
            if !known.contains(&node_id) {
                return Err(ApatiteError::Referential(format!(
                    "Element {} references unknown node {}",
                    index + 1,
                    node_id
                )));
            }
        }
    }

    Ok(())
}

/// Maximum z coordinate across all nodes. Zero for an empty table.
fn model_height(nodes: &[Node]) -> f64 {
    nodes.iter().map(|node| node.z).fold(0.0, f64::max)
}

/// Writes the geometry file: node coordinates followed by element
/// connectivity, under the solver's section tags
///
/// # Arguments
/// * `path` - Destination path for the geometry file
/// * `nodes` - All nodes, in file order
/// * `elements` - All elements, in file order
fn write_model(path: &Path, nodes: &[Node], elements: &[Element]) -> Result<(), ApatiteError> {
    let file = match File::create(path) {
        Ok(f) => f,
        Err(_err) => {
            return Err(ApatiteError::Io(format!(
                "Unable to create output file {}",
                path.display()
            )))
        }
    };
    let mut writer = BufWriter::new(file);

    writeln!(writer, "*THREE_DIMENSIONAL")?;
    writeln!(writer, "*NODES")?;

    let bar = ProgressBar::new(nodes.len() as u64);
    for node in nodes {
        writeln!(writer, "{} {:?} {:?} {:?}", node.id, node.x, node.y, node.z)?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    writeln!(writer, "*ELEMENTS")?;

    // element indices restart at 1 here no matter what ids the mesher embedded
    let bar = ProgressBar::new(elements.len() as u64);
    for (index, element) in elements.iter().enumerate() {
        let n = element.nodes;
        writeln!(
            writer,
            "{} 3 8 1 {} {} {} {} {} {} {} {} 1",
            index + 1,
            n[0],
            n[1],
            n[2],
            n[3],
            n[4],
            n[5],
            n[6],
            n[7]
        )?;
        bar.inc(1);
    }
    bar.finish_and_clear();

    writer.flush()?;
    Ok(())
}

/// Writes the restraint file, one record per node sitting exactly on the
/// base plane. The comparison is exact on purpose: the mesher emits z = 0.0
/// for base nodes, and a tolerance band would pull in the next voxel layer.
fn write_restraints(path: &Path, nodes: &[Node]) -> Result<usize, ApatiteError> {
    let file = match File::create(path) {
        Ok(f) => f,
        Err(_err) => {
            return Err(ApatiteError::Io(format!(
                "Unable to create output file {}",
                path.display()
            )))
        }
    };
    let mut writer = BufWriter::new(file);

    let mut count = 0;
    for node in nodes {
        if node.z == 0.0 {
            writeln!(writer, "{} 1 1 1", node.id)?;
            count += 1;
        }
    }

    writer.flush()?;
    Ok(count)
}

/// Writes the fixed-displacement file, one record per node sitting exactly on
/// the top face, each prescribing the same z displacement
fn write_fixed_displacements(
    path: &Path,
    nodes: &[Node],
    height: f64,
    displacement: f64,
) -> Result<usize, ApatiteError> {
    let file = match File::create(path) {
        Ok(f) => f,
        Err(_err) => {
            return Err(ApatiteError::Io(format!(
                "Unable to create output file {}",
                path.display()
            )))
        }
    };
    let mut writer = BufWriter::new(file);

    let mut count = 0;
    for node in nodes {
        if node.z == height {
            writeln!(writer, "{} 3 {:?}", node.id, displacement)?;
            count += 1;
        }
    }

    writer.flush()?;
    Ok(count)
}

/// Writes the load file. Every node gets a zero-magnitude record, restrained
/// or not; the solver expects the file to cover the full node set.
fn write_loads(path: &Path, nodes: &[Node]) -> Result<usize, ApatiteError> {
    let file = match File::create(path) {
        Ok(f) => f,
        Err(_err) => {
            return Err(ApatiteError::Io(format!(
                "Unable to create output file {}",
                path.display()
            )))
        }
    };
    let mut writer = BufWriter::new(file);

    let mut count = 0;
    for node in nodes {
        writeln!(writer, "{} 0.0 0.0 0.0", node.id)?;
        count += 1;
    }

    writer.flush()?;
    Ok(count)
}

/// Writes the control record that tells the solver how much of everything to
/// expect. Runs last; the counts come from the writers, never from re-reading
/// the emitted files.
fn write_control(
    path: &Path,
    totals: &ConversionTotals,
    solver: &SolverParams,
) -> Result<(), ApatiteError> {
    let file = match File::create(path) {
        Ok(f) => f,
        Err(_err) => {
            return Err(ApatiteError::Io(format!(
                "Unable to create output file {}",
                path.display()
            )))
        }
    };
    let mut writer = BufWriter::new(file);

    writeln!(
        writer,
        "{} {} {} {} {} {}",
        totals.elements,
        totals.nodes,
        totals.restrained,
        totals.loaded,
        totals.fixed,
        solver.integration_points
    )?;
    writeln!(
        writer,
        "{} {:?} {:?} {:?}",
        solver.iteration_limit, solver.tolerance, solver.youngs_modulus, solver.poisson_ratio
    )?;
    writeln!(writer, "{}", solver.nodes_per_element)?;
    writeln!(writer, "{} {}", solver.load_steps, solver.output_interval)?;
    writeln!(writer, "{:?}", solver.displacement_tolerance)?;

    writer.flush()?;
    Ok(())
}

/// The five solver input files for a job, in write order: geometry,
/// restraints, fixed displacements, loads, control record
pub fn output_paths(out_dir: &Path, job_name: &str) -> [PathBuf; 5] {
    ["d", "bnd", "fix", "lds", "dat"].map(|ext| out_dir.join(format!("{}.{}", job_name, ext)))
}

/// Converts the mesher's node and element tables into the solver's five
/// input files
///
/// # Arguments
/// * `out_dir` - Directory holding the mesher tables; outputs land here too
/// * `job_name` - Stem for the five output filenames
/// * `displacement_ratio` - Percentage of the model height applied as
///   top-face displacement
/// * `solver` - Parameters echoed into the control record
///
/// # Returns
/// The record counts and derived scalars of the finished conversion
pub fn run(
    out_dir: &Path,
    job_name: &str,
    displacement_ratio: f64,
    solver: &SolverParams,
) -> Result<ConversionTotals, ApatiteError> {
    println!("info: reading mesher tables...");
    let nodes = read_node_table(&out_dir.join(NODE_TABLE))?;
    let elements = read_element_table(&out_dir.join(ELEMENT_TABLE))?;
    check_connectivity(&nodes, &elements)?;
    println!(
        "info: loaded {} nodes and {} elements",
        nodes.len(),
        elements.len()
    );

    // the prescribed displacement scales with the model height, so the extent
    // scan must complete before any fixed-displacement record can be written
    let height = model_height(&nodes);
    let displacement = height * displacement_ratio / 100.0;

    let [model_path, restraint_path, fixed_path, load_path, control_path] =
        output_paths(out_dir, job_name);

    println!("info: writing solver input files...");
    write_model(&model_path, &nodes, &elements)?;
    let restrained = write_restraints(&restraint_path, &nodes)?;
    let loaded = write_loads(&load_path, &nodes)?;
    let fixed = write_fixed_displacements(&fixed_path, &nodes, height, displacement)?;

    let totals = ConversionTotals {
        nodes: nodes.len(),
        elements: elements.len(),
        restrained,
        loaded,
        fixed,
        model_height: height,
        displacement,
    };
    println!(
        "info: model height {:?}, top-face displacement {:?}",
        totals.model_height, totals.displacement
    );
    write_control(&control_path, &totals, solver)?;

    Ok(totals)
}
