// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicU32, Ordering};

use ash::{ext::debug_utils, vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use umbra_render::{RenderError, Result};

use crate::convert::VkContext;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"umbra";

/// Counts validation messages severe enough to fail the frame.
#[derive(Default)]
pub(crate) struct ValidationCounter(AtomicU32);

impl ValidationCounter {
    /// Counts WARNING and ERROR messages. Returns whether the message was counted.
    pub(crate) fn record(&self, severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> bool {
        let fatal = severity.intersects(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        );
        if fatal {
            self.0.fetch_add(1, Ordering::AcqRel);
        }
        fatal
    }

    /// Messages counted since the previous call.
    pub(crate) fn take(&self) -> u32 {
        self.0.swap(0, Ordering::AcqRel)
    }
}

/// Any counted validation message fails the call that produced it.
pub(crate) fn validation_status(counted: u32) -> Result<()> {
    match counted {
        0 => Ok(()),
        n => Err(RenderError::Validation(n)),
    }
}

/// Debug messenger plus the count of validation warnings and errors seen since the last check.
pub(crate) struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    counter: Box<ValidationCounter>,
}

impl DebugMessenger {
    /// Warnings and errors reported since the previous call.
    pub(crate) fn take_errors(&self) -> u32 {
        self.counter.take()
    }

    pub(crate) unsafe fn destroy(&self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.messenger, None) };
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user: *mut c_void,
) -> vk::Bool32 {
    let msg = if data.is_null() || unsafe { (*data).p_message.is_null() } {
        std::borrow::Cow::Borrowed("<no message>")
    } else {
        unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!("[vulkan] {msg}");
    } else {
        tracing::debug!("[vulkan] {msg}");
    }
    if !user.is_null() {
        let counter = unsafe { &*(user as *const ValidationCounter) };
        counter.record(severity);
    }
    vk::FALSE
}

pub(crate) fn load_entry() -> Result<Entry> {
    unsafe { Entry::load() }.map_err(|e| RenderError::MissingCapability {
        kind: "Vulkan loader",
        name: e.to_string(),
    })
}

fn layer_available(entry: &Entry, layer: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|p| unsafe { CStr::from_ptr(p.layer_name.as_ptr()) } == layer)
}

/// Creates the instance with the window-system extensions. Returns whether
/// validation ended up enabled.
pub(crate) unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    want_validation: bool,
) -> Result<(Instance, bool)> {
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: 0,
        p_engine_name: APP_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_1,
        ..Default::default()
    };

    let mut extensions = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let validation = want_validation && layer_available(entry, VALIDATION_LAYER);
    if want_validation && !validation {
        tracing::warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
    }
    let layers = [VALIDATION_LAYER.as_ptr()];
    let (enabled_layer_count, pp_enabled_layer_names) = if validation {
        extensions.push(debug_utils::NAME.as_ptr());
        (layers.len() as u32, layers.as_ptr())
    } else {
        (0, std::ptr::null())
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count,
        pp_enabled_layer_names,
        ..Default::default()
    };

    let instance = unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?;
    Ok((instance, validation))
}

pub(crate) unsafe fn create_debug_messenger(entry: &Entry, instance: &Instance) -> Result<DebugMessenger> {
    let loader = debug_utils::Instance::new(entry, instance);
    let counter = Box::new(ValidationCounter::default());
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        p_user_data: counter.as_ref() as *const ValidationCounter as *mut c_void,
        ..Default::default()
    };
    let messenger =
        unsafe { loader.create_debug_utils_messenger(&ci, None) }.context("create_debug_utils_messenger")?;
    Ok(DebugMessenger {
        loader,
        messenger,
        counter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    type Severity = vk::DebugUtilsMessageSeverityFlagsEXT;

    #[test]
    fn warnings_and_errors_are_counted() {
        let counter = ValidationCounter::default();
        assert!(counter.record(Severity::ERROR));
        assert!(counter.record(Severity::WARNING));
        assert_eq!(counter.take(), 2);
    }

    #[test]
    fn info_and_verbose_are_ignored() {
        let counter = ValidationCounter::default();
        assert!(!counter.record(Severity::INFO));
        assert!(!counter.record(Severity::VERBOSE));
        assert_eq!(counter.take(), 0);
    }

    #[test]
    fn counted_warning_becomes_validation_error() {
        let counter = ValidationCounter::default();
        counter.record(Severity::WARNING);
        assert!(matches!(validation_status(counter.take()), Err(RenderError::Validation(1))));
        assert!(validation_status(counter.take()).is_ok());
    }

    #[test]
    fn take_resets_the_count() {
        let counter = ValidationCounter::default();
        counter.record(Severity::WARNING);
        assert_eq!(counter.take(), 1);
        assert_eq!(counter.take(), 0);
    }
}
