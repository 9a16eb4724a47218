//! JNI bindings for the Android app.
//!
//! Each public function here corresponds to an `external fun` declaration
//! in NavBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.
//!
//! A session lives behind an opaque `jlong` handle created by
//! `nativeStart` and freed by `nativeStop`. Calls that produce events
//! return them as a JSON array of tagged `NavEvent` objects. All calls
//! for one handle must come from the same (UI) thread.

use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jdouble, jlong, jstring, JNI_TRUE};
use jni::JNIEnv;
use log::{error, warn};

use crate::config::NavConfig;
use crate::error::{NavError, Result};
use crate::geometry::Point;
use crate::location::{LocationSource, PositionFix, SubscribeOptions, SubscriptionHandle};
use crate::route::{parse_directions, Profile, Route};
use crate::session::{NavEvent, NavigationSession};

/// The Kotlin side owns the platform location subscription. It tells the
/// bridge whether permission was granted; fixes arrive via `nativeOnFix`.
struct HostLocation {
    granted: bool,
}

impl LocationSource for HostLocation {
    fn subscribe(&mut self, _options: SubscribeOptions) -> Result<SubscriptionHandle> {
        if self.granted {
            Ok(SubscriptionHandle(1))
        } else {
            Err(NavError::PositionUnavailable("location permission denied".to_string()))
        }
    }

    fn unsubscribe(&mut self, _handle: SubscriptionHandle) {}
}

struct NativeSession {
    session: NavigationSession,
    source: HostLocation,
    /// Events produced by `nativeStart`, delivered with the next call.
    outbox: Vec<NavEvent>,
}

fn init_logging() {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(log::LevelFilter::Debug)
            .with_tag("navtrack"),
    );
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Option<String> {
    if value.is_null() {
        return None;
    }
    match env.get_string(value) {
        Ok(s) => Some(s.into()),
        Err(e) => {
            warn!("Failed to read Java string: {e}");
            None
        }
    }
}

fn events_to_jstring(env: &mut JNIEnv, events: &[NavEvent]) -> jstring {
    let json = serde_json::to_string(events).unwrap_or_else(|e| {
        error!("Failed to serialize events: {e}");
        "[]".to_string()
    });
    match env.new_string(json) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            error!("Failed to create Java string: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Borrow the session behind a handle.
///
/// # Safety
/// `handle` must be 0 or a value returned by `nativeStart` that has not
/// been passed to `nativeStop`.
unsafe fn native<'a>(handle: jlong) -> Option<&'a mut NativeSession> {
    unsafe { (handle as *mut NativeSession).as_mut() }
}

/// Take pending start events and append `events`.
fn respond(env: &mut JNIEnv, native: &mut NativeSession, events: Vec<NavEvent>) -> jstring {
    let mut all = std::mem::take(&mut native.outbox);
    all.extend(events);
    events_to_jstring(env, &all)
}

fn optional(value: jdouble) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Returns the library version.
/// Maps to: NavBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_navtrack_app_NavBridge_version(
    env: JNIEnv,
    _class: JClass,
) -> jstring {
    match env.new_string(crate::VERSION) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Start a session from a routing-provider response.
/// Maps to: NavBridge.nativeStart(routeJson, profile, destLat, destLon,
/// configJson, permissionGranted, nowMs) -> Long
///
/// Returns 0 if navigation cannot start.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "system" fn Java_com_navtrack_app_NavBridge_nativeStart<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    route_json: JString<'local>,
    profile: JString<'local>,
    dest_lat: jdouble,
    dest_lon: jdouble,
    config_json: JString<'local>,
    permission_granted: jboolean,
    now_ms: jlong,
) -> jlong {
    init_logging();

    let profile = read_string(&mut env, &profile)
        .and_then(|p| Profile::parse(&p))
        .unwrap_or_default();

    let config = match read_string(&mut env, &config_json) {
        Some(json) => match NavConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid navigation config: {e}");
                return 0;
            }
        },
        None => NavConfig::default(),
    };

    let Some(route_json) = read_string(&mut env, &route_json) else {
        error!("No route given");
        return 0;
    };
    let route = match parse_directions(&route_json) {
        Ok(response) => Route::from_response(&response, profile),
        Err(e) => {
            error!("Cannot start navigation: {e}");
            return 0;
        }
    };

    let mut source = HostLocation {
        granted: permission_granted == JNI_TRUE,
    };
    let now_ms = u64::try_from(now_ms).unwrap_or(0);
    match NavigationSession::start(route, Point::new(dest_lat, dest_lon), config, &mut source, now_ms) {
        Ok((session, outbox)) => {
            let native = Box::new(NativeSession { session, source, outbox });
            Box::into_raw(native) as jlong
        }
        Err(e) => {
            error!("Cannot start navigation: {e}");
            0
        }
    }
}

/// Feed one fix. NaN marks an absent speed, heading or accuracy.
/// Maps to: NavBridge.nativeOnFix(handle, lat, lon, speed, heading,
/// accuracy, timestampMs, nowMs) -> String
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub extern "system" fn Java_com_navtrack_app_NavBridge_nativeOnFix<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    handle: jlong,
    lat: jdouble,
    lon: jdouble,
    speed: jdouble,
    heading: jdouble,
    accuracy: jdouble,
    timestamp_ms: jlong,
    now_ms: jlong,
) -> jstring {
    let Some(native) = (unsafe { native(handle) }) else {
        return events_to_jstring(&mut env, &[]);
    };

    let fix = PositionFix {
        lat,
        lon,
        speed: optional(speed),
        heading: optional(heading),
        accuracy: optional(accuracy),
        timestamp_ms: u64::try_from(timestamp_ms).unwrap_or(0),
    };
    let events = native.session.on_fix_at(fix, u64::try_from(now_ms).unwrap_or(0));
    respond(&mut env, native, events)
}

/// Deliver the routing provider's answer to a reroute request. The
/// `generation` is the one carried by the `reroute_requested` event; a
/// null `responseJson` means the request failed with `errorMessage`.
/// Maps to: NavBridge.nativeRerouteResult(handle, generation,
/// responseJson?, errorMessage?) -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_navtrack_app_NavBridge_nativeRerouteResult<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    handle: jlong,
    generation: jlong,
    response_json: JString<'local>,
    error_message: JString<'local>,
) -> jstring {
    let Some(native) = (unsafe { native(handle) }) else {
        return events_to_jstring(&mut env, &[]);
    };

    let result = match read_string(&mut env, &response_json) {
        Some(json) => parse_directions(&json),
        None => {
            let reason = read_string(&mut env, &error_message).unwrap_or_else(|| "unknown error".to_string());
            Err(NavError::RouteFetch(reason))
        }
    };
    let Ok(generation) = u64::try_from(generation) else {
        warn!("Ignoring reroute result with negative generation {generation}");
        return respond(&mut env, native, Vec::new());
    };
    let events = native.session.complete_reroute(generation, result);
    respond(&mut env, native, events)
}

/// Maps to: NavBridge.nativeSetFollow(handle, follow)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_navtrack_app_NavBridge_nativeSetFollow(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    follow: jboolean,
) {
    if let Some(native) = unsafe { native(handle) } {
        native.session.set_camera_follow(follow == JNI_TRUE);
    }
}

/// Maps to: NavBridge.nativeSetVoice(handle, enabled) -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_navtrack_app_NavBridge_nativeSetVoice<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    handle: jlong,
    enabled: jboolean,
) -> jstring {
    let Some(native) = (unsafe { native(handle) }) else {
        return events_to_jstring(&mut env, &[]);
    };
    let events = native.session.set_voice_enabled(enabled == JNI_TRUE);
    respond(&mut env, native, events)
}

/// The app finished or failed speaking utterance `id`.
/// Maps to: NavBridge.nativeSpeechDone(handle, id)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_navtrack_app_NavBridge_nativeSpeechDone(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
    id: jlong,
) {
    if let Some(native) = unsafe { native(handle) } {
        native.session.speech_finished(u64::try_from(id).unwrap_or(0));
    }
}

/// Stop navigating and free the session. The handle is invalid afterwards.
/// Maps to: NavBridge.nativeStop(handle) -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_navtrack_app_NavBridge_nativeStop<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass<'local>,
    handle: jlong,
) -> jstring {
    if handle == 0 {
        return events_to_jstring(&mut env, &[]);
    }

    let mut native = unsafe { Box::from_raw(handle as *mut NativeSession) };
    let NativeSession { session, source, .. } = &mut *native;
    let events = session.stop(source);
    events_to_jstring(&mut env, &events)
}
