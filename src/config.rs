use json::JsonValue;

use crate::datatypes::SolverParams;
use crate::error::ApatiteError;

/// How the external mesher is run: directly on the workstation, or through a
/// PBS batch job on the cluster.
#[derive(Debug, PartialEq)]
pub enum JobType {
    Workstation,
    Hpc { walltime: String, budget_code: String },
}

#[derive(Debug)]
pub struct Config {
    // directories section; img/cal1/cal2/m_files are relative to work_dir and
    // concatenated onto it, trailing separators included in the entries
    pub work_dir: String,
    pub img_dir: String,
    pub out_dir: String,
    pub cal1_dir: String,
    pub cal2_dir: String,
    pub m_files_dir: String,
    pub ld_lib_path: String,
    // images section
    pub img_names: String,
    pub cal_names: String,
    // mesher parameters, forwarded to the Matlab entry point untouched
    pub n_cells: String,
    pub bone_threshold: String,
    pub marrow_threshold: String,
    pub image_resolution: String,
    // percentage of the model height applied as top-face displacement
    pub displacement_ratio: f64,
    pub job_name: String,
    pub job_type: JobType,
    pub solver: SolverParams,
}

impl Config {
    /// Loads and validates a job configuration file
    ///
    /// # Arguments
    /// * `path` - The path to the configuration json
    ///
    /// # Returns
    /// A populated Config instance
    pub fn load(path: &str) -> Result<Config, ApatiteError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_err) => {
                return Err(ApatiteError::Config(format!(
                    "Unable to open config file {}",
                    path
                )))
            }
        };

        let root = match json::parse(&contents) {
            Ok(j) => j,
            Err(err) => {
                return Err(ApatiteError::Config(format!(
                    "Error in config json: {err}"
                )))
            }
        };

        for section in ["directories", "images", "parameters", "job"] {
            if !root.has_key(section) {
                return Err(ApatiteError::Config(format!(
                    "Config missing {} section",
                    section
                )));
            }
        }

        let directories = &root["directories"];
        let images = &root["images"];
        let parameters = &root["parameters"];
        let job = &root["job"];

        let displacement_ratio = require_f64(parameters, "parameters", "displacement_ratio")?;
        if displacement_ratio < 0.0 {
            return Err(ApatiteError::Config(
                "displacement_ratio must be zero or positive".to_owned(),
            ));
        }

        let job_name = require_str(job, "job", "name")?;
        let job_type = match require_str(job, "job", "type")?.as_str() {
            "HPC" => JobType::Hpc {
                walltime: require_str(job, "job", "walltime")?,
                budget_code: require_str(job, "job", "budget_code")?,
            },
            // anything else runs the mesher locally
            _ => JobType::Workstation,
        };

        Ok(Config {
            work_dir: require_str(directories, "directories", "work")?,
            img_dir: require_str(directories, "directories", "img")?,
            out_dir: require_str(directories, "directories", "out_dir")?,
            cal1_dir: require_str(directories, "directories", "cal1")?,
            cal2_dir: require_str(directories, "directories", "cal2")?,
            m_files_dir: require_str(directories, "directories", "m_files")?,
            ld_lib_path: require_str(directories, "directories", "ld_lib_path")?,
            img_names: require_str(images, "images", "img_names")?,
            cal_names: require_str(images, "images", "cal_names")?,
            n_cells: require_str(parameters, "parameters", "n_cells")?,
            bone_threshold: require_str(parameters, "parameters", "grey_bone_threshold")?,
            marrow_threshold: require_str(parameters, "parameters", "grey_marrow_threshold")?,
            image_resolution: require_str(parameters, "parameters", "image_resolution")?,
            displacement_ratio,
            job_name,
            job_type,
            solver: parse_solver(&root["solver"])?,
        })
    }
}

/// Reads a required string field out of a config section
fn require_str(section: &JsonValue, section_name: &str, key: &str) -> Result<String, ApatiteError> {
    match section[key].as_str() {
        Some(value) => Ok(value.to_owned()),
        None => Err(ApatiteError::Config(format!(
            "Config missing {} field in {} section",
            key, section_name
        ))),
    }
}

/// Reads a required float field out of a config section
fn require_f64(section: &JsonValue, section_name: &str, key: &str) -> Result<f64, ApatiteError> {
    match section[key].as_f64() {
        Some(value) => Ok(value),
        None => Err(ApatiteError::Config(format!(
            "Config missing {} field in {} section",
            key, section_name
        ))),
    }
}

/// Reads a required integer field out of a config section
fn require_usize(section: &JsonValue, section_name: &str, key: &str) -> Result<usize, ApatiteError> {
    match section[key].as_usize() {
        Some(value) => Ok(value),
        None => Err(ApatiteError::Config(format!(
            "Config missing {} field in {} section",
            key, section_name
        ))),
    }
}

/// Builds the solver parameters from the optional solver section. Absent
/// fields keep the production defaults.
fn parse_solver(section: &JsonValue) -> Result<SolverParams, ApatiteError> {
    let mut params = SolverParams::default();

    if section.is_null() {
        return Ok(params);
    }

    if section.has_key("integration_points") {
        params.integration_points = require_usize(section, "solver", "integration_points")?;
    }
    if section.has_key("iteration_limit") {
        params.iteration_limit = require_usize(section, "solver", "iteration_limit")?;
    }
    if section.has_key("tolerance") {
        params.tolerance = require_f64(section, "solver", "tolerance")?;
    }
    if section.has_key("youngs_modulus") {
        params.youngs_modulus = require_f64(section, "solver", "youngs_modulus")?;
    }
    if section.has_key("poisson_ratio") {
        params.poisson_ratio = require_f64(section, "solver", "poisson_ratio")?;
    }
    if section.has_key("nodes_per_element") {
        params.nodes_per_element = require_usize(section, "solver", "nodes_per_element")?;
    }
    if section.has_key("load_steps") {
        params.load_steps = require_usize(section, "solver", "load_steps")?;
    }
    if section.has_key("output_interval") {
        params.output_interval = require_usize(section, "solver", "output_interval")?;
    }
    if section.has_key("displacement_tolerance") {
        params.displacement_tolerance = require_f64(section, "solver", "displacement_tolerance")?;
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(&path, contents).unwrap();
        let path = path.to_str().unwrap().to_owned();
        (dir, path)
    }

    fn full_config_json() -> String {
        r#"{
            "directories": {
                "work": "/data/run/",
                "img": "scan/",
                "out_dir": "/data/run/out",
                "cal1": "cal_a/",
                "cal2": "cal_b/",
                "m_files": "m_files/",
                "ld_lib_path": "/opt/mcr/v90"
            },
            "images": {
                "img_names": "slice_*.tif",
                "cal_names": "cal_*.tif"
            },
            "parameters": {
                "n_cells": "5",
                "grey_bone_threshold": "120",
                "grey_marrow_threshold": "60",
                "image_resolution": "0.0196",
                "displacement_ratio": 0.5
            },
            "job": {
                "name": "femur_04",
                "type": "workstation"
            }
        }"#
        .to_owned()
    }

    #[test]
    fn test_loads_full_config() {
        let (_dir, path) = write_config(&full_config_json());
        let cfg = Config::load(&path).unwrap();

        assert_eq!(cfg.work_dir, "/data/run/");
        assert_eq!(cfg.img_names, "slice_*.tif");
        assert_eq!(cfg.bone_threshold, "120");
        assert_eq!(cfg.displacement_ratio, 0.5);
        assert_eq!(cfg.job_name, "femur_04");
        assert_eq!(cfg.job_type, JobType::Workstation);
    }

    #[test]
    fn test_solver_defaults_when_section_absent() {
        let (_dir, path) = write_config(&full_config_json());
        let cfg = Config::load(&path).unwrap();

        assert_eq!(cfg.solver.integration_points, 8);
        assert_eq!(cfg.solver.nodes_per_element, 8);
        assert_eq!(cfg.solver.youngs_modulus, 17.0e3);
        assert_eq!(cfg.solver.poisson_ratio, 0.3);
        assert_eq!(cfg.solver.load_steps, 1);
    }

    #[test]
    fn test_solver_overrides() {
        let contents = full_config_json().replace(
            "\"job\":",
            r#""solver": { "iteration_limit": 500, "youngs_modulus": 12000.0 },
            "job":"#,
        );
        let (_dir, path) = write_config(&contents);
        let cfg = Config::load(&path).unwrap();

        assert_eq!(cfg.solver.iteration_limit, 500);
        assert_eq!(cfg.solver.youngs_modulus, 12000.0);
        // untouched fields keep their defaults
        assert_eq!(cfg.solver.tolerance, 1e-5);
    }

    #[test]
    fn test_unrecognized_job_type_runs_on_workstation() {
        let contents =
            full_config_json().replace(r#""type": "workstation""#, r#""type": "cloud""#);
        let (_dir, path) = write_config(&contents);
        let cfg = Config::load(&path).unwrap();

        assert_eq!(cfg.job_type, JobType::Workstation);
    }

    #[test]
    fn test_hpc_job_carries_walltime_and_budget() {
        let contents = full_config_json().replace(
            r#""type": "workstation""#,
            r#""type": "HPC", "walltime": "01:00:00", "budget_code": "d137-bone""#,
        );
        let (_dir, path) = write_config(&contents);
        let cfg = Config::load(&path).unwrap();

        assert_eq!(
            cfg.job_type,
            JobType::Hpc {
                walltime: "01:00:00".to_owned(),
                budget_code: "d137-bone".to_owned(),
            }
        );
    }

    #[test]
    fn test_hpc_job_missing_walltime_fails() {
        let contents = full_config_json().replace(
            r#""type": "workstation""#,
            r#""type": "HPC", "budget_code": "d137-bone""#,
        );
        let (_dir, path) = write_config(&contents);
        let err = Config::load(&path).unwrap_err();

        assert!(matches!(err, ApatiteError::Config(_)));
        assert!(err.to_string().contains("walltime"));
    }

    #[test]
    fn test_missing_section_fails() {
        let contents = full_config_json().replace("\"images\":", "\"pictures\":");
        let (_dir, path) = write_config(&contents);
        let err = Config::load(&path).unwrap_err();

        assert!(err.to_string().contains("images section"));
    }

    #[test]
    fn test_missing_displacement_ratio_fails() {
        let contents = full_config_json().replace(r#""displacement_ratio": 0.5"#, r#""unused": 0"#);
        let (_dir, path) = write_config(&contents);
        let err = Config::load(&path).unwrap_err();

        assert!(err.to_string().contains("displacement_ratio"));
    }

    #[test]
    fn test_negative_displacement_ratio_fails() {
        let contents = full_config_json().replace(
            r#""displacement_ratio": 0.5"#,
            r#""displacement_ratio": -1.0"#,
        );
        let (_dir, path) = write_config(&contents);

        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        let (_dir, path) = write_config("{ not json");

        assert!(matches!(
            Config::load(&path),
            Err(ApatiteError::Config(_))
        ));
    }
}
