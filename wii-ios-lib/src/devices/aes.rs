//! `/dev/aes`: AES-128-CBC with a caller-supplied key.

use wii_ios_core::codes::{IPC_EINVAL, IPC_SUCCESS};
use wii_ios_core::{IoVector, IoctlvRequest, IpcReply};
use wii_ios_crypto::aes::{BLOCK_SIZE, cbc_decrypt, cbc_encrypt};

use super::read_array;
use crate::device::{Device, DeviceEnv};

const IOCTLV_COPY: u32 = 0;
const IOCTLV_ENCRYPT: u32 = 2;
const IOCTLV_DECRYPT: u32 = 3;

#[derive(Debug, Default, Clone, Copy)]
pub struct AesDevice;

fn is_block_param(vector: &IoVector) -> bool {
    vector.address % 4 == 0 && vector.size as usize == BLOCK_SIZE
}

impl AesDevice {
    fn copy(env: &mut DeviceEnv<'_>, request: &IoctlvRequest) -> i32 {
        if !request.has_number_of_valid_vectors(1, 1) {
            return IPC_EINVAL;
        }
        let len = request.in_size(0).min(request.io_size(0)) as usize;
        let data = env.memory.copy_from_emu(request.in_address(0), len);
        env.memory.copy_to_emu(request.io_address(0), &data);
        IPC_SUCCESS
    }

    fn crypt(env: &mut DeviceEnv<'_>, request: &IoctlvRequest, encrypt: bool) -> i32 {
        if !request.has_number_of_valid_vectors(2, 2) {
            return IPC_EINVAL;
        }
        let (input, key, output, iv) = (
            request.in_vectors[0],
            request.in_vectors[1],
            request.io_vectors[0],
            request.io_vectors[1],
        );
        if !is_block_param(&key) || !is_block_param(&iv) {
            log::warn!("/dev/aes: key or IV is not an aligned 16-byte buffer");
            return IPC_EINVAL;
        }
        if input.size != output.size || input.size as usize % BLOCK_SIZE != 0 {
            log::warn!(
                "/dev/aes: bad data sizes (in {:#x}, out {:#x})",
                input.size,
                output.size
            );
            return IPC_EINVAL;
        }

        let key_bytes: [u8; 16] = read_array(&*env.memory, key.address);
        let mut iv_bytes: [u8; 16] = read_array(&*env.memory, iv.address);
        let data = env.memory.copy_from_emu(input.address, input.size as usize);

        let result = if encrypt {
            cbc_encrypt(&key_bytes, &mut iv_bytes, &data)
        } else {
            cbc_decrypt(&key_bytes, &mut iv_bytes, &data)
        };
        env.memory.copy_to_emu(output.address, &result);
        env.memory.copy_to_emu(iv.address, &iv_bytes);
        IPC_SUCCESS
    }
}

impl Device for AesDevice {
    fn name(&self) -> &'static str {
        "/dev/aes"
    }

    fn ioctlv(&mut self, env: &mut DeviceEnv<'_>, request: &IoctlvRequest) -> Option<IpcReply> {
        let ret = match request.request {
            IOCTLV_COPY => Self::copy(env, request),
            IOCTLV_ENCRYPT => Self::crypt(env, request, true),
            IOCTLV_DECRYPT => Self::crypt(env, request, false),
            other => {
                log::warn!("/dev/aes: unknown ioctlv {other:#x}");
                IPC_EINVAL
            }
        };
        Some(IpcReply::new(ret))
    }
}
