//! Windows audio endpoint enumeration via the MMDevice API.
//!
//! Lists active capture endpoints as inputs and active render endpoints as
//! loopback sources, with the friendly name of the endpoint and of its
//! device interface.

use windows::core::PCWSTR;
use windows::Win32::Devices::FunctionDiscovery::{PKEY_DeviceInterface_FriendlyName, PKEY_Device_FriendlyName};
use windows::Win32::Foundation::PROPERTYKEY;
use windows::Win32::Media::Audio::{
    eCapture, eRender, EDataFlow, IMMDevice, IMMDeviceEnumerator, MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_ALL, STGM_READ};
use windows::Win32::UI::Shell::PropertiesSystem::IPropertyStore;

use aurora_capture_core::models::endpoint::{EndpointDescriptor, EndpointDirection};
use aurora_capture_core::models::error::RecorderError;

/// Endpoint enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, RecorderError> {
        let enumerator: IMMDeviceEnumerator = unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }
            .map_err(|e| RecorderError::EndpointEnumeration(format!("failed to create enumerator: {}", e)))?;
        Ok(Self { enumerator })
    }

    /// Every active endpoint: capture endpoints first, then render endpoints.
    pub fn list_active_endpoints(&self) -> Result<Vec<EndpointDescriptor>, RecorderError> {
        let mut endpoints = self.list(eCapture, EndpointDirection::Input)?;
        endpoints.extend(self.list(eRender, EndpointDirection::OutputLoopback)?);
        Ok(endpoints)
    }

    /// Look up a device by endpoint id.
    pub fn device(&self, endpoint_id: &str) -> Result<IMMDevice, RecorderError> {
        let wide_id: Vec<u16> = endpoint_id.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe { self.enumerator.GetDevice(PCWSTR(wide_id.as_ptr())) }
            .map_err(|e| RecorderError::device_open(endpoint_id, format!("GetDevice failed: {}", e)))
    }

    fn list(&self, data_flow: EDataFlow, direction: EndpointDirection) -> Result<Vec<EndpointDescriptor>, RecorderError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(data_flow, DEVICE_STATE_ACTIVE)
                .map_err(|e| RecorderError::EndpointEnumeration(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| RecorderError::EndpointEnumeration(format!("GetCount failed: {}", e)))?;

            let mut endpoints = Vec::with_capacity(count as usize);
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let id = match device.GetId() {
                    Ok(id) => {
                        let text = id.to_string().unwrap_or_default();
                        CoTaskMemFree(Some(id.0 as *const _));
                        text
                    }
                    Err(e) => {
                        log::debug!("Skipping endpoint {} without id: {}", i, e);
                        continue;
                    }
                };

                let store = device.OpenPropertyStore(STGM_READ).ok();
                let name = store
                    .as_ref()
                    .and_then(|s| read_string(s, &PKEY_Device_FriendlyName))
                    .unwrap_or_else(|| format!("Device {}", i));
                let interface = store
                    .as_ref()
                    .and_then(|s| read_string(s, &PKEY_DeviceInterface_FriendlyName))
                    .unwrap_or_default();

                endpoints.push(EndpointDescriptor::new(id, name, &interface, direction));
            }

            log::debug!("Enumerated {} active {} endpoint(s)", endpoints.len(), direction);
            Ok(endpoints)
        }
    }
}

fn read_string(store: &IPropertyStore, key: &PROPERTYKEY) -> Option<String> {
    let value = unsafe { store.GetValue(key) }.ok()?;
    let text = value.to_string();
    (!text.is_empty()).then_some(text)
}
