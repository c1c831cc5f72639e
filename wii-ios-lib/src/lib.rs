//! The emulated IOS kernel and everything built directly on it: device
//! dispatch, ES verification, NAND import and persisted settings.

pub mod device;
pub mod devices;
pub mod error;
pub mod es;
pub mod kernel;
pub mod nand_import;
pub mod settings;

pub use device::{Device, DeviceEnv};
pub use error::{EsError, ImportError, KernelError, SettingsError};
pub use es::{EsCore, TicketReader, VerifyContainerType, VerifyMode};
pub use kernel::EmulationKernel;
pub use nand_import::{ImportProgress, ImportSummary, LogProgress, SilentProgress};
pub use settings::{ConsoleKind, Settings};
