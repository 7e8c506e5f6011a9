use std::sync::Arc;

use glam::{Mat4, Vec3};

use compute_raytracer::render::present::TransformBlock;
use compute_raytracer::render::{
    Barrier, GpuCall, Pipeline, RecordingDevice, Resource, ShaderStage, UniformValue, Viewport,
    WorkGroups,
};
use compute_raytracer::{
    Camera, CameraController, InputState, KeyCode, Light, NamedKey, SceneDescription, ShaderSources,
    Sphere, MAX_LIGHTS, MAX_SPHERES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Upload,
    Dispatch,
    Barrier,
    Sample,
}

fn phase(call: &GpuCall) -> Option<Phase> {
    match call {
        GpuCall::SetUniform { .. } => Some(Phase::Upload),
        GpuCall::Dispatch { .. } => Some(Phase::Dispatch),
        GpuCall::MemoryBarrier(Barrier::ShaderImageAccess) => Some(Phase::Barrier),
        GpuCall::BindTexture { .. } | GpuCall::Draw { .. } => Some(Phase::Sample),
        _ => None,
    }
}

fn ready_pipeline(
    device: &Arc<RecordingDevice>,
    viewport: Viewport,
) -> Pipeline<RecordingDevice> {
    let mut pipeline = Pipeline::new(Arc::clone(device), viewport, ShaderSources::builtin());
    pipeline.initialize().expect("pipeline initializes");
    device.clear_calls();
    pipeline
}

fn camera() -> Camera {
    Camera::new(Vec3::ZERO, Camera::DEFAULT_FOV_DEGREES, 1280.0 / 720.0)
}

fn uploads(device: &RecordingDevice) -> Vec<(String, UniformValue)> {
    device
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            GpuCall::SetUniform { name, value, .. } => Some((name, value)),
            _ => None,
        })
        .collect()
}

fn upload_bytes(uploads: &[(String, UniformValue)]) -> Vec<(String, [u8; 12])> {
    uploads
        .iter()
        .map(|(name, value)| {
            let mut bytes = [0u8; 12];
            value.write_to(&mut bytes);
            (name.clone(), bytes)
        })
        .collect()
}

fn value_of(uploads: &[(String, UniformValue)], name: &str) -> Option<UniformValue> {
    uploads
        .iter()
        .find(|(candidate, _)| candidate == name)
        .map(|(_, value)| *value)
}

fn lights(count: usize) -> Vec<Light> {
    (0..count)
        .map(|index| Light::new(Vec3::new(index as f32, 4.0, 0.0), 0.5, Vec3::ONE))
        .collect()
}

fn spheres(count: usize) -> Vec<Sphere> {
    (0..count)
        .map(|index| Sphere::new(Vec3::new(index as f32 * 3.0, 0.0, -10.0), 1.0, Vec3::ONE, 0.25))
        .collect()
}

#[test]
fn every_frame_uploads_then_dispatches_then_barriers_then_samples() {
    let device = Arc::new(RecordingDevice::new());
    let mut pipeline = ready_pipeline(&device, Viewport::new(1280, 720));
    let scene = SceneDescription::demo();

    for _ in 0..3 {
        pipeline.frame(&camera(), &scene).unwrap();
    }

    let mut phases: Vec<Phase> = device.calls().iter().filter_map(phase).collect();
    phases.dedup();
    let expected: Vec<Phase> = [Phase::Upload, Phase::Dispatch, Phase::Barrier, Phase::Sample]
        .into_iter()
        .cycle()
        .take(12)
        .collect();
    assert_eq!(phases, expected);
}

#[test]
fn five_configured_spheres_upload_count_five_and_nothing_beyond() {
    let device = Arc::new(RecordingDevice::new());
    let mut pipeline = ready_pipeline(&device, Viewport::new(1280, 720));
    let scene = SceneDescription::new(spheres(5), lights(1));

    pipeline.frame(&camera(), &scene).unwrap();
    let uploads = uploads(&device);

    assert_eq!(value_of(&uploads, "sphereCount"), Some(UniformValue::Int(5)));
    for index in 5..MAX_SPHERES {
        let prefix = format!("spheres[{index}].");
        assert!(
            !uploads.iter().any(|(name, _)| name.starts_with(&prefix)),
            "slot {index} was written"
        );
    }
    assert_eq!(
        value_of(&uploads, "spheres[4].radius"),
        Some(UniformValue::Float(1.0))
    );
}

#[test]
fn single_light_is_uploaded_once() {
    let device = Arc::new(RecordingDevice::new());
    let mut pipeline = ready_pipeline(&device, Viewport::new(1280, 720));
    let scene = SceneDescription::new(spheres(2), lights(1));

    pipeline.frame(&camera(), &scene).unwrap();
    let uploads = uploads(&device);

    assert_eq!(value_of(&uploads, "lightCount"), Some(UniformValue::Int(1)));
    for field in ["position", "intensity", "color"] {
        let name = format!("lights[0].{field}");
        assert_eq!(uploads.iter().filter(|(candidate, _)| *candidate == name).count(), 1);
    }
    assert!(!uploads.iter().any(|(name, _)| name.starts_with("lights[1].")));
}

#[test]
fn counts_are_clamped_to_capacity() {
    let device = Arc::new(RecordingDevice::new());
    let mut pipeline = ready_pipeline(&device, Viewport::new(1280, 720));
    let scene = SceneDescription::new(spheres(MAX_SPHERES + 5), lights(MAX_LIGHTS + 2));

    pipeline.frame(&camera(), &scene).unwrap();
    let uploads = uploads(&device);

    assert_eq!(
        value_of(&uploads, "sphereCount"),
        Some(UniformValue::Int(MAX_SPHERES as i32))
    );
    assert_eq!(
        value_of(&uploads, "lightCount"),
        Some(UniformValue::Int(MAX_LIGHTS as i32))
    );
    assert!(!uploads
        .iter()
        .any(|(name, _)| name.starts_with(&format!("spheres[{MAX_SPHERES}]."))));
}

#[test]
fn unresolved_uniform_is_skipped_without_error() {
    let device = Arc::new(RecordingDevice::new().with_missing_uniform("lights[3].color"));
    let mut pipeline = ready_pipeline(&device, Viewport::new(1280, 720));
    let scene = SceneDescription::new(spheres(1), lights(4));

    pipeline.frame(&camera(), &scene).unwrap();
    let uploads = uploads(&device);

    assert!(value_of(&uploads, "lights[3].position").is_some());
    assert!(value_of(&uploads, "lights[3].color").is_none());
    assert_eq!(value_of(&uploads, "lightCount"), Some(UniformValue::Int(4)));
}

#[test]
fn viewport_1280x720_is_covered_exactly() {
    let device = Arc::new(RecordingDevice::new());
    let mut pipeline = ready_pipeline(&device, Viewport::new(1280, 720));

    pipeline.frame(&camera(), &SceneDescription::demo()).unwrap();
    let calls = device.calls();

    let groups = calls
        .iter()
        .find_map(|call| match call {
            GpuCall::Dispatch { groups, .. } => Some(*groups),
            _ => None,
        })
        .expect("frame dispatches");
    assert_eq!(groups, WorkGroups { x: 160, y: 90, z: 1 });

    let transform = calls
        .iter()
        .find_map(|call| match call {
            GpuCall::WriteBuffer { data, .. } => {
                Some(bytemuck::pod_read_unaligned::<TransformBlock>(data))
            }
            _ => None,
        })
        .expect("frame uploads transforms");
    assert_eq!(
        Mat4::from_cols_array_2d(&transform.model),
        Mat4::from_scale(Vec3::new(1280.0, 720.0, 1.0))
    );
    assert_eq!(Mat4::from_cols_array_2d(&transform.view), Mat4::IDENTITY);
}

#[test]
fn unchanged_state_produces_identical_uploads() {
    let device = Arc::new(RecordingDevice::new());
    let mut pipeline = ready_pipeline(&device, Viewport::new(1280, 720));
    let scene = SceneDescription::demo();
    let camera = camera();

    pipeline.frame(&camera, &scene).unwrap();
    let first = uploads(&device);
    device.clear_calls();
    pipeline.frame(&camera, &scene).unwrap();
    let second = uploads(&device);

    assert!(!first.is_empty());
    assert_eq!(upload_bytes(&first), upload_bytes(&second));
}

#[test]
fn uploads_compare_by_bit_pattern() {
    let zero = vec![("camera.x".to_string(), UniformValue::Float(0.0))];
    let negative_zero = vec![("camera.x".to_string(), UniformValue::Float(-0.0))];
    let nan = vec![("camera.x".to_string(), UniformValue::Float(f32::NAN))];

    assert_ne!(upload_bytes(&zero), upload_bytes(&negative_zero));
    assert_eq!(upload_bytes(&nan), upload_bytes(&nan));
}

#[test]
fn release_is_idempotent_and_frees_everything() {
    let device = Arc::new(RecordingDevice::new());
    let mut pipeline = ready_pipeline(&device, Viewport::new(1280, 720));
    let image = pipeline.compute().output_image().expect("image exists");

    pipeline.release();
    pipeline.release();

    let destroyed: Vec<Resource> = device
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            GpuCall::Destroy(resource) => Some(resource),
            _ => None,
        })
        .collect();
    assert_eq!(destroyed.len(), 10);
    assert_eq!(destroyed.last(), Some(&Resource::Image(image)));
    assert_eq!(device.live_resources(), 0);
    assert!(pipeline.frame(&camera(), &SceneDescription::demo()).is_err());
}

#[test]
fn failed_link_reports_diagnostic_and_leaks_nothing() {
    let device = Arc::new(RecordingDevice::new().with_link_failure("entry point `main` not found"));
    let mut pipeline = Pipeline::new(
        Arc::clone(&device),
        Viewport::new(1280, 720),
        ShaderSources::builtin(),
    );

    let err = pipeline.initialize().unwrap_err();
    assert!(err.to_string().contains("entry point `main` not found"));
    assert_eq!(device.live_resources(), 0);
}

#[test]
fn failed_fragment_compile_releases_both_stages() {
    let device = Arc::new(
        RecordingDevice::new().with_compile_failure(ShaderStage::Fragment, "unknown identifier"),
    );
    let mut pipeline = Pipeline::new(
        Arc::clone(&device),
        Viewport::new(640, 480),
        ShaderSources::builtin(),
    );

    let err = pipeline.initialize().unwrap_err();
    assert!(err.to_string().contains("fragment shader failed to compile"));
    assert!(!pipeline.is_ready());
    assert_eq!(device.live_resources(), 0);
}

#[test]
fn camera_stays_orthonormal_under_input() {
    let mut camera = camera();
    let mut controller = CameraController::new();
    let mut input = InputState::new();
    input.set_key_down(KeyCode::Named(NamedKey::Up));
    input.set_key_down(KeyCode::Named(NamedKey::Left));
    input.set_key_down(KeyCode::Character('W'));

    for _ in 0..240 {
        controller.update(&mut camera, &input, 1.0 / 60.0);
        assert!(camera.is_orthonormal(1e-4));
    }
    assert!(controller.pitch() <= 89.0);
}
