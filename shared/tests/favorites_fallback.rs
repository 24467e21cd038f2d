use gallery_shared::testing::{ApiCall, FakeGallery};
use gallery_shared::{
    CategoryId, ClientConfig, GalleryApi, GalleryError, GalleryImage, ImageId, SyncCoordinator,
    UserId,
};
use secrecy::SecretString;

const FAVORITES: CategoryId = CategoryId(100);
const TRAVEL: CategoryId = CategoryId(1);
const ANIMALS: CategoryId = CategoryId(2);

fn image(id: i64) -> GalleryImage {
    GalleryImage::new(ImageId(id), UserId(1), format!("photo {id}"), format!("https://img/{id}.jpg"))
}

fn gallery() -> FakeGallery {
    FakeGallery::new()
        .with_account("alice", "secret", UserId(1))
        .with_favorites_category(FAVORITES)
        .with_category(TRAVEL, "Voyages", UserId(1))
        .with_category(ANIMALS, "Animaux", UserId(1))
        .with_image(TRAVEL, image(1))
        .with_image(TRAVEL, image(2))
        .with_image(TRAVEL, image(7))
        .with_image(ANIMALS, image(9))
}

async fn ready(gallery: FakeGallery) -> SyncCoordinator<FakeGallery> {
    let coordinator = SyncCoordinator::new(gallery, ClientConfig::default()).unwrap();
    coordinator
        .login("alice", &SecretString::new("secret".into()))
        .await
        .unwrap();
    coordinator.fetch_categories().await.unwrap();
    coordinator.settle().await;
    coordinator
}

fn ids(images: &[GalleryImage]) -> Vec<ImageId> {
    images.iter().map(|i| i.id).collect()
}

#[tokio::test]
async fn favorites_view_survives_endpoint_outage() {
    let coordinator = ready(gallery()).await;

    // 1. Like one image in each category
    coordinator.select_category(TRAVEL).await.unwrap();
    coordinator.like_image(ImageId(7)).await.unwrap();
    coordinator.select_category(ANIMALS).await.unwrap();
    coordinator.like_image(ImageId(9)).await.unwrap();

    // 2. Favorites endpoint goes down
    coordinator
        .api()
        .fail(ApiCall::ListImages, GalleryError::transport("connection reset"));

    // 3. Degraded success: the shadow cache is served instead
    let shown = coordinator.select_category(FAVORITES).await.unwrap();
    assert_eq!(ids(&shown), vec![ImageId(7), ImageId(9)]);
    assert!(shown.iter().all(|i| i.is_favorite));
    assert_eq!(ids(&coordinator.images().await), vec![ImageId(7), ImageId(9)]);
    assert_eq!(coordinator.current_category().await, Some(FAVORITES));
}

#[tokio::test]
async fn empty_shadow_means_real_failure() {
    let coordinator = ready(gallery()).await;
    coordinator.select_category(TRAVEL).await.unwrap();
    let before = coordinator.images().await;

    coordinator
        .api()
        .fail(ApiCall::ListImages, GalleryError::rejected(503, "maintenance"));

    let err = coordinator.fetch_images(FAVORITES).await.unwrap_err();
    assert_eq!(err, GalleryError::rejected(503, "maintenance"));
    assert_eq!(coordinator.images().await, before);
    assert_eq!(coordinator.current_category().await, Some(TRAVEL));
}

#[tokio::test]
async fn other_categories_never_fall_back() {
    let coordinator = ready(gallery()).await;
    coordinator.select_category(TRAVEL).await.unwrap();
    coordinator.like_image(ImageId(7)).await.unwrap();

    coordinator
        .api()
        .fail(ApiCall::ListImages, GalleryError::transport("offline"));

    assert!(coordinator.fetch_images(ANIMALS).await.is_err());
    assert_eq!(coordinator.current_category().await, Some(TRAVEL));
}

#[tokio::test]
async fn fetched_images_are_reconciled_with_shadow() {
    let coordinator = ready(gallery()).await;
    coordinator.select_category(TRAVEL).await.unwrap();
    coordinator.like_image(ImageId(2)).await.unwrap();

    // 1. Server stops reporting the like; the local projection still wins
    let other = coordinator
        .api()
        .authenticate("alice", &SecretString::new("secret".into()))
        .await
        .unwrap();
    coordinator
        .api()
        .unlike_image(ImageId(2), &other.token)
        .await
        .unwrap();

    // 2. Refetch
    let images = coordinator.fetch_images(TRAVEL).await.unwrap();
    let flags: Vec<_> = images.iter().map(|i| (i.id, i.is_favorite)).collect();
    assert_eq!(
        flags,
        vec![(ImageId(1), false), (ImageId(2), true), (ImageId(7), false)]
    );
}

#[tokio::test]
async fn like_is_idempotent() {
    let coordinator = ready(gallery()).await;
    coordinator.select_category(TRAVEL).await.unwrap();

    coordinator.like_image(ImageId(7)).await.unwrap();
    let images_once = coordinator.images().await;
    let favorites_once = coordinator.favorites().await;

    coordinator.like_image(ImageId(7)).await.unwrap();
    assert_eq!(coordinator.images().await, images_once);
    assert_eq!(coordinator.favorites().await, favorites_once);
    assert_eq!(coordinator.favorites().await.len(), 1);
}

#[tokio::test]
async fn unlike_reverts_like() {
    let coordinator = ready(gallery()).await;
    coordinator.select_category(TRAVEL).await.unwrap();

    coordinator.like_image(ImageId(7)).await.unwrap();
    coordinator.unlike_image(ImageId(7)).await.unwrap();

    let image = coordinator
        .images()
        .await
        .into_iter()
        .find(|i| i.id == ImageId(7))
        .unwrap();
    assert!(!image.is_favorite);
    assert!(coordinator.favorites().await.iter().all(|i| i.id != ImageId(7)));
}

#[tokio::test]
async fn like_outside_current_view_still_reaches_shadow() {
    let coordinator = ready(gallery()).await;
    coordinator.select_category(TRAVEL).await.unwrap();

    coordinator.like_image(ImageId(9)).await.unwrap();
    assert_eq!(ids(&coordinator.favorites().await), vec![ImageId(9)]);
    assert!(coordinator.images().await.iter().all(|i| !i.is_favorite));
}

#[tokio::test]
async fn warmup_fills_shadow_from_server_favorites() {
    let seeded = gallery().with_image(ANIMALS, image(12).favorited(true));
    let coordinator = ready(seeded).await;

    assert_eq!(ids(&coordinator.favorites().await), vec![ImageId(12)]);

    // Fallback works right away without any like in this session.
    coordinator
        .api()
        .fail(ApiCall::ListImages, GalleryError::transport("offline"));
    let shown = coordinator.select_category(FAVORITES).await.unwrap();
    assert_eq!(ids(&shown), vec![ImageId(12)]);
}

#[tokio::test]
async fn failed_warmup_leaves_shadow_empty_and_is_not_retried() {
    let seeded = gallery().with_image(ANIMALS, image(12).favorited(true));
    seeded.fail(ApiCall::ListImages, GalleryError::transport("offline"));
    let coordinator = ready(seeded).await;
    assert!(coordinator.favorites().await.is_empty());

    coordinator.api().heal(ApiCall::ListImages);
    coordinator.fetch_categories().await.unwrap();
    coordinator.settle().await;

    assert!(coordinator.favorites().await.is_empty());
    assert_eq!(coordinator.api().calls(ApiCall::ListImages), 1);
}

#[tokio::test]
async fn deleted_favorite_is_not_resurrected_by_fallback() {
    let coordinator = ready(gallery()).await;
    coordinator.select_category(TRAVEL).await.unwrap();
    coordinator.like_image(ImageId(1)).await.unwrap();
    coordinator.like_image(ImageId(7)).await.unwrap();
    coordinator.delete_image(ImageId(7)).await.unwrap();

    coordinator
        .api()
        .fail(ApiCall::ListImages, GalleryError::transport("offline"));
    let shown = coordinator.select_category(FAVORITES).await.unwrap();
    assert_eq!(ids(&shown), vec![ImageId(1)]);
}
