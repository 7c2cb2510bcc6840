//! Request dispatch: decoded MC commands onto device memory, the CPU
//! mode and the ladder engine.

use ladder_engine::Engine;
use melsec_frame::{EndCode, Request, Response};
use plc_device::{DeviceError, DeviceMemory};

use crate::config::ServerConfig;

/// Map a device memory error to its MC end code.
///
/// Range faults answer 0xC056 whether the head alone or head + count
/// overruns the class space; 0xC050 is reserved for device-spec faults
/// the codec reports.
fn end_code_for(error: DeviceError) -> EndCode {
    match error {
        DeviceError::InvalidDevice(..) => EndCode::InvalidDevice,
        DeviceError::AddressOutOfRange(..) => EndCode::AddressRange,
        DeviceError::PointCount(_) => EndCode::TooManyPoints,
    }
}

/// Execute one decoded request, producing the end code and payload for
/// the reply.
pub(crate) fn dispatch(
    request: &Request,
    memory: &DeviceMemory,
    engine: &Engine,
    config: &ServerConfig,
) -> (EndCode, Response) {
    match request {
        Request::ReadWords { class, head, count } => {
            match memory.read_words(*class, *head, u32::from(*count)) {
                Ok(words) => (EndCode::Success, Response::Words(words)),
                Err(error) => (end_code_for(error), Response::Ack),
            }
        }
        Request::ReadBits { class, head, count } => {
            match memory.read_bits(*class, *head, u32::from(*count)) {
                Ok(bits) => (EndCode::Success, Response::Bits(bits)),
                Err(error) => (end_code_for(error), Response::Ack),
            }
        }
        Request::WriteWords {
            class,
            head,
            values,
        } => match memory.write_words(*class, *head, values) {
            Ok(()) => (EndCode::Success, Response::Ack),
            Err(error) => (end_code_for(error), Response::Ack),
        },
        Request::WriteBits { class, head, bits } => {
            match memory.write_bits(*class, *head, bits) {
                Ok(()) => (EndCode::Success, Response::Ack),
                Err(error) => (end_code_for(error), Response::Ack),
            }
        }
        Request::ReadCpuModel => (
            EndCode::Success,
            Response::CpuModel {
                name: config.cpu_model.clone(),
                code: config.cpu_model_code,
            },
        ),
        Request::RemoteRun => {
            engine.start();
            (EndCode::Success, Response::Ack)
        }
        Request::RemoteStop => {
            engine.stop();
            (EndCode::Success, Response::Ack)
        }
        Request::RemotePause => {
            engine.pause();
            (EndCode::Success, Response::Ack)
        }
        Request::RemoteReset => {
            engine.reset();
            (EndCode::Success, Response::Ack)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plc_device::{CpuMode, DeviceClass, ModeCell};
    use std::sync::Arc;
    use std::time::Duration;

    fn context() -> (Arc<DeviceMemory>, Arc<ModeCell>, Engine, ServerConfig) {
        let memory = Arc::new(DeviceMemory::new());
        let mode = Arc::new(ModeCell::new());
        let engine = Engine::new(
            Arc::clone(&memory),
            Arc::clone(&mode),
            Duration::from_millis(1),
        );
        (memory, mode, engine, ServerConfig::default())
    }

    #[test]
    fn word_write_then_read() {
        let (memory, _mode, engine, config) = context();
        let (code, _) = dispatch(
            &Request::WriteWords {
                class: DeviceClass::D,
                head: 0,
                values: vec![1234],
            },
            &memory,
            &engine,
            &config,
        );
        assert_eq!(code, EndCode::Success);

        let (code, response) = dispatch(
            &Request::ReadWords {
                class: DeviceClass::D,
                head: 0,
                count: 1,
            },
            &memory,
            &engine,
            &config,
        );
        assert_eq!(code, EndCode::Success);
        assert_eq!(response, Response::Words(vec![1234]));
    }

    #[test]
    fn range_fault_answers_c056() {
        let (memory, _mode, engine, config) = context();
        let (code, _) = dispatch(
            &Request::ReadWords {
                class: DeviceClass::D,
                head: DeviceClass::D.size(),
                count: 1,
            },
            &memory,
            &engine,
            &config,
        );
        assert_eq!(code, EndCode::AddressRange);
    }

    #[test]
    fn point_ceiling_answers_c051() {
        let (memory, _mode, engine, config) = context();
        let (code, _) = dispatch(
            &Request::ReadWords {
                class: DeviceClass::D,
                head: 0,
                count: 961,
            },
            &memory,
            &engine,
            &config,
        );
        assert_eq!(code, EndCode::TooManyPoints);
    }

    #[test]
    fn width_fault_answers_c05c() {
        let (memory, _mode, engine, config) = context();
        let (code, _) = dispatch(
            &Request::ReadBits {
                class: DeviceClass::D,
                head: 0,
                count: 1,
            },
            &memory,
            &engine,
            &config,
        );
        assert_eq!(code, EndCode::InvalidDevice);
    }

    #[test]
    fn remote_control_drives_the_mode() {
        let (memory, mode, engine, config) = context();
        dispatch(&Request::RemoteRun, &memory, &engine, &config);
        assert_eq!(mode.get(), CpuMode::Run);
        dispatch(&Request::RemotePause, &memory, &engine, &config);
        assert_eq!(mode.get(), CpuMode::Pause);
        dispatch(&Request::RemoteStop, &memory, &engine, &config);
        assert_eq!(mode.get(), CpuMode::Stop);
    }

    #[test]
    fn remote_reset_clears_memory() {
        let (memory, mode, engine, config) = context();
        memory.write_word(DeviceClass::D, 5, 99).unwrap();
        let (code, _) = dispatch(&Request::RemoteReset, &memory, &engine, &config);
        assert_eq!(code, EndCode::Success);
        assert_eq!(mode.get(), CpuMode::Stop);
        assert_eq!(memory.read_word(DeviceClass::D, 5).unwrap(), 0);
    }

    #[test]
    fn model_read_answers_the_configured_cpu() {
        let (memory, _mode, engine, config) = context();
        let (code, response) = dispatch(&Request::ReadCpuModel, &memory, &engine, &config);
        assert_eq!(code, EndCode::Success);
        assert_eq!(
            response,
            Response::CpuModel {
                name: "Q03UDECPU".to_string(),
                code: 0x0263,
            }
        );
    }
}
