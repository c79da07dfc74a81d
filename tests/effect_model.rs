mod common;

use std::sync::Arc;

use bokeh_cam::camera::CameraFrame;
use bokeh_cam::effects::EffectSettings;
use bokeh_cam::error::ModelError;
use bokeh_cam::ml::{EffectModel, ModelStatus};
use common::{model_config, wait_until, GatedSegmenter};

fn model(segmenter: &Arc<GatedSegmenter>) -> Arc<EffectModel> {
    Arc::new(EffectModel::new(segmenter.clone(), model_config()))
}

#[tokio::test]
async fn test_concurrent_loads_share_one_backend_load() {
    let segmenter = Arc::new(GatedSegmenter::closed());
    let model = model(&segmenter);

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let model = Arc::clone(&model);
            tokio::spawn(async move { model.ensure_loaded().await })
        })
        .collect();

    wait_until(|| segmenter.loads() == 1).await;
    assert_eq!(model.status(), ModelStatus::Loading);
    segmenter.release();

    let mut handles = Vec::new();
    for waiter in waiters {
        handles.push(waiter.await.unwrap().unwrap());
    }
    assert!(handles.windows(2).all(|w| w[0].same_model(&w[1])));
    assert_eq!(segmenter.loads(), 1);
    assert_eq!(model.loads_started(), 1);
    assert!(model.is_ready());
}

#[tokio::test]
async fn test_concurrent_waiters_share_failure_and_retry() {
    let segmenter = Arc::new(GatedSegmenter::closed());
    segmenter.set_fail_loads(true);
    let model = model(&segmenter);

    let a = tokio::spawn({
        let model = Arc::clone(&model);
        async move { model.ensure_loaded().await }
    });
    let b = tokio::spawn({
        let model = Arc::clone(&model);
        async move { model.ensure_loaded().await }
    });
    wait_until(|| segmenter.loads() == 1).await;
    segmenter.release();

    let a = a.await.unwrap().unwrap_err();
    let b = b.await.unwrap().unwrap_err();
    assert!(matches!(a, ModelError::Load(_)));
    assert_eq!(a, b);
    assert_eq!(model.status(), ModelStatus::Unloaded);

    segmenter.set_fail_loads(false);
    assert!(model.ensure_loaded().await.is_ok());
    assert_eq!(segmenter.loads(), 2);
}

#[tokio::test]
async fn test_frame_failure_is_per_frame() {
    let segmenter = Arc::new(GatedSegmenter::open());
    segmenter.fail_frames([7]);
    let model = model(&segmenter);
    model.ensure_loaded().await.unwrap();

    let settings = EffectSettings::default();
    let bad = CameraFrame::new(vec![0; 16], 2, 2, 7);
    let good = CameraFrame::new(vec![0; 16], 2, 2, 8);

    assert!(matches!(
        model.compute_frame(&bad, &settings).await,
        Err(ModelError::FrameProcessing(_))
    ));
    assert!(model.compute_frame(&good, &settings).await.is_ok());
    assert!(model.is_ready());
}
