#[derive(Debug, PartialEq)]
pub struct Node {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Hexahedral element connectivity, eight corner node ids in mesher order.
#[derive(Debug, PartialEq)]
pub struct Element {
    pub nodes: [usize; 8],
}

/// Solver parameters echoed into the control record, in the solver's own
/// naming: nip, limit, tol, e, v, nodpel, nloadstep, jump, tol2.
#[derive(Debug, Clone)]
pub struct SolverParams {
    pub integration_points: usize,
    pub iteration_limit: usize,
    pub tolerance: f64,
    pub youngs_modulus: f64,
    pub poisson_ratio: f64,
    pub nodes_per_element: usize,
    pub load_steps: usize,
    pub output_interval: usize,
    pub displacement_tolerance: f64,
}

impl Default for SolverParams {
    fn default() -> SolverParams {
        SolverParams {
            integration_points: 8,
            iteration_limit: 2000,
            tolerance: 1e-5,
            youngs_modulus: 17.0e3,
            poisson_ratio: 0.3,
            nodes_per_element: 8,
            load_steps: 1,
            output_interval: 1,
            displacement_tolerance: 1e-5,
        }
    }
}

/// Record counts and derived scalars accumulated while writing the solver
/// input files. The counts in the control record come from here, never from
/// re-reading the written files.
#[derive(Debug)]
pub struct ConversionTotals {
    pub nodes: usize,
    pub elements: usize,
    pub restrained: usize,
    pub loaded: usize,
    pub fixed: usize,
    pub model_height: f64,
    pub displacement: f64,
}
