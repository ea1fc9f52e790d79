use camino::Utf8Path;

use crate::{CommandExecutor, ExecutorError};

pub trait CommandExecutorExt: CommandExecutor {
    /// Runs a batch file through `cmd.exe /C`, or a shell script through
    /// `/bin/sh` elsewhere.
    ///
    /// Fails with [`ExecutorError::FileNotFound`] without spawning anything
    /// when `batch_file` does not exist.
    fn execute_batch_file_blocking(
        &self,
        batch_file: &Utf8Path,
        parameters: &str,
        working_dir: &Utf8Path,
        path_extension: Option<&str>,
        on_output_line: &mut dyn FnMut(&str),
    ) -> Result<i32, ExecutorError> {
        if !batch_file.is_file() {
            return Err(ExecutorError::FileNotFound(batch_file.to_path_buf()));
        }

        let (shell, flag) = gtrun_system::platform_shell();
        let arguments = if cfg!(windows) {
            vec![flag.to_string(), format!("\"{batch_file}\" {parameters}")]
        } else {
            let mut arguments = vec![batch_file.to_string()];
            arguments.extend(
                shlex::split(parameters)
                    .ok_or_else(|| ExecutorError::InvalidCommandLine(parameters.to_string()))?,
            );
            arguments
        };

        Ok(self.execute_command_blocking(
            &shell,
            &arguments,
            working_dir,
            path_extension,
            &[],
            on_output_line,
        ))
    }
}

impl<T: CommandExecutor + ?Sized> CommandExecutorExt for T {}
