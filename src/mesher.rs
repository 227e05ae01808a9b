use crate::{
    config::{Config, JobType},
    error::ApatiteError,
};

/// What happened to the mesher stage: either it ran to completion here, or
/// it was handed to the batch queue and will finish later.
#[derive(Debug, PartialEq)]
pub enum MesherOutcome {
    Completed,
    Submitted,
}

/// The ten positional parameters the Matlab entry point expects, in its
/// fixed order. The image and calibration folders are the work directory
/// with the relative entries appended.
fn mesher_args(config: &Config) -> Vec<String> {
    vec![
        format!("{}{}", config.work_dir, config.img_dir),
        config.img_names.clone(),
        config.bone_threshold.clone(),
        config.n_cells.clone(),
        config.marrow_threshold.clone(),
        config.image_resolution.clone(),
        format!("{}{}", config.work_dir, config.cal1_dir),
        format!("{}{}", config.work_dir, config.cal2_dir),
        config.cal_names.clone(),
        config.out_dir.clone(),
    ]
}

/// Path of the compiled Matlab launcher inside the m-files directory
fn mesher_script(config: &Config) -> String {
    format!("{}{}run_main.sh", config.work_dir, config.m_files_dir)
}

/// Renders the PBS batch script that runs the mesher on the cluster
fn batch_script(config: &Config, walltime: &str, budget_code: &str) -> String {
    let mut script = String::new();
    script.push_str("#!/bin/bash --login\n");
    script.push_str(&format!("#PBS -N {}\n", config.job_name));
    script.push_str("#PBS -l select=serial=true:ncpus=1\n");
    script.push_str(&format!("#PBS -l walltime={}\n", walltime));
    script.push_str(&format!("#PBS -A {}\n", budget_code));
    script.push_str("export PBS_O_WORKDIR=$(readlink -f $PBS_O_WORKDIR)\n");
    script.push_str("cd $PBS_O_WORKDIR\n");
    script.push_str("module load mcr/9.0\n");

    // the command goes through bash on the compute node, so the parameters
    // are quoted against spaces
    script.push_str(&mesher_script(config));
    script.push(' ');
    script.push_str(&config.ld_lib_path);
    for param in mesher_args(config) {
        script.push_str(&format!(" \"{}\"", param));
    }
    script.push('\n');

    script
}

/// Runs the mesher synchronously on this machine
fn run_local(config: &Config) -> Result<(), ApatiteError> {
    let script = mesher_script(config);
    println!("info: running mesher {}", script);

    let status = match std::process::Command::new(&script)
        .arg(&config.ld_lib_path)
        .args(mesher_args(config))
        .status()
    {
        Ok(status) => status,
        Err(err) => {
            return Err(ApatiteError::Mesher(format!(
                "Unable to launch mesher {}: {}",
                script, err
            )))
        }
    };

    if !status.success() {
        return Err(ApatiteError::Mesher(format!("Mesher failed ({})", status)));
    }

    Ok(())
}

/// Writes the batch script next to the working directory and submits it
/// through qsub
fn submit_batch(config: &Config, walltime: &str, budget_code: &str) -> Result<(), ApatiteError> {
    let script_path = format!("apatite_{}.sh", config.job_name);
    std::fs::write(&script_path, batch_script(config, walltime, budget_code))?;

    println!("info: submitting batch job {}", script_path);
    let status = match std::process::Command::new("qsub").arg(&script_path).status() {
        Ok(status) => status,
        Err(err) => {
            return Err(ApatiteError::Mesher(format!(
                "Unable to run qsub: {}",
                err
            )))
        }
    };

    if !status.success() {
        return Err(ApatiteError::Mesher(format!("qsub failed ({})", status)));
    }

    Ok(())
}

/// Launches the external mesher according to the configured job type
///
/// # Arguments
/// * `config` - The loaded job configuration
///
/// # Returns
/// Whether the mesher ran to completion or was handed to the batch queue
pub fn run(config: &Config) -> Result<MesherOutcome, ApatiteError> {
    match &config.job_type {
        JobType::Hpc {
            walltime,
            budget_code,
        } => {
            submit_batch(config, walltime, budget_code)?;
            Ok(MesherOutcome::Submitted)
        }
        JobType::Workstation => {
            run_local(config)?;
            Ok(MesherOutcome::Completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::SolverParams;

    fn test_config() -> Config {
        Config {
            work_dir: "/data/run/".to_owned(),
            img_dir: "scan/".to_owned(),
            out_dir: "/data/run/out".to_owned(),
            cal1_dir: "cal_a/".to_owned(),
            cal2_dir: "cal_b/".to_owned(),
            m_files_dir: "m_files/".to_owned(),
            ld_lib_path: "/opt/mcr/v90".to_owned(),
            img_names: "slice_*.tif".to_owned(),
            cal_names: "cal_*.tif".to_owned(),
            n_cells: "5".to_owned(),
            bone_threshold: "120".to_owned(),
            marrow_threshold: "60".to_owned(),
            image_resolution: "0.0196".to_owned(),
            displacement_ratio: 0.5,
            job_name: "femur_04".to_owned(),
            job_type: JobType::Workstation,
            solver: SolverParams::default(),
        }
    }

    #[test]
    fn test_mesher_args_keep_entry_point_order() {
        let args = mesher_args(&test_config());

        assert_eq!(
            args,
            [
                "/data/run/scan/",
                "slice_*.tif",
                "120",
                "5",
                "60",
                "0.0196",
                "/data/run/cal_a/",
                "/data/run/cal_b/",
                "cal_*.tif",
                "/data/run/out",
            ]
        );
    }

    #[test]
    fn test_mesher_script_path() {
        assert_eq!(
            mesher_script(&test_config()),
            "/data/run/m_files/run_main.sh"
        );
    }

    #[test]
    fn test_batch_script_contents() {
        let script = batch_script(&test_config(), "02:00:00", "d137-bone");

        assert!(script.starts_with("#!/bin/bash --login\n"));
        assert!(script.contains("#PBS -N femur_04\n"));
        assert!(script.contains("#PBS -l select=serial=true:ncpus=1\n"));
        assert!(script.contains("#PBS -l walltime=02:00:00\n"));
        assert!(script.contains("#PBS -A d137-bone\n"));
        assert!(script.contains("module load mcr/9.0\n"));
        assert!(script.ends_with(
            "/data/run/m_files/run_main.sh /opt/mcr/v90 \
             \"/data/run/scan/\" \"slice_*.tif\" \"120\" \"5\" \"60\" \"0.0196\" \
             \"/data/run/cal_a/\" \"/data/run/cal_b/\" \"cal_*.tif\" \"/data/run/out\"\n"
        ));
    }

    #[test]
    fn test_missing_mesher_script_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.work_dir = format!("{}/", dir.path().display());

        let err = run_local(&config).unwrap_err();

        assert!(matches!(err, ApatiteError::Mesher(_)));
        assert!(err.to_string().contains("Unable to launch mesher"));
    }
}
