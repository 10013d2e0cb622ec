#[cfg(test)]
mod tests {
    use crate::db::{
        add_favorite, list_favorites, list_tracked_items, remove_favorite, upsert_tracked_item,
    };
    use crate::error::AppError;
    use crate::models::{ApplicationStatus, FavoriteTarget, TargetType, TrackingFilter};
    use crate::test::test_utils::{TestDb, create_standard_test_db};

    fn alice(test_db: &TestDb) -> i64 {
        test_db.user_id("user_alice")
    }

    #[rocket::async_test]
    async fn test_favorite_lifecycle() {
        let test_db = create_standard_test_db().await;
        let user_id = alice(&test_db);
        let course = FavoriteTarget::course(test_db.course_id("Master of Data Science"));

        let favorite = add_favorite(&test_db.pool, user_id, course)
            .await
            .expect("First add should succeed");
        assert_eq!(favorite.target_type, TargetType::Course);
        assert_eq!(favorite.name, "Master of Data Science");
        assert_eq!(favorite.city, "Melbourne");

        let duplicate = add_favorite(&test_db.pool, user_id, course).await;
        assert!(matches!(duplicate, Err(AppError::Duplicate(_))));

        let removed = remove_favorite(&test_db.pool, user_id, course)
            .await
            .expect("Remove should succeed");
        assert!(removed);

        let removed_again = remove_favorite(&test_db.pool, user_id, course)
            .await
            .expect("Removing an absent favorite is not an error");
        assert!(!removed_again);

        let favorites = list_favorites(&test_db.pool, user_id, None)
            .await
            .expect("Failed to list favorites");
        assert!(favorites.is_empty());
    }

    #[rocket::async_test]
    async fn test_favorite_unknown_target_is_not_found() {
        let test_db = create_standard_test_db().await;
        let user_id = alice(&test_db);

        let result = add_favorite(&test_db.pool, user_id, FavoriteTarget::course(9999)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let result = add_favorite(&test_db.pool, user_id, FavoriteTarget::university(9999)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[rocket::async_test]
    async fn test_course_and_university_favorites_are_separate() {
        let test_db = create_standard_test_db().await;
        let user_id = alice(&test_db);
        let university_id = test_db.university_id("TU Munich");
        let course_id = test_db.course_id("MSc Informatics");

        add_favorite(&test_db.pool, user_id, FavoriteTarget::course(course_id))
            .await
            .expect("Failed to add course favorite");
        let university = add_favorite(
            &test_db.pool,
            user_id,
            FavoriteTarget::university(university_id),
        )
        .await
        .expect("Failed to add university favorite");

        assert_eq!(university.name, "TU Munich");
        assert_eq!(university.city, "Munich");

        let all = list_favorites(&test_db.pool, user_id, None)
            .await
            .expect("Failed to list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].target_type, TargetType::Course);
        assert_eq!(all[1].target_type, TargetType::University);

        let universities = list_favorites(&test_db.pool, user_id, Some(TargetType::University))
            .await
            .expect("Failed to list");
        assert_eq!(universities.len(), 1);
        assert_eq!(universities[0].target_id, university_id);
    }

    #[rocket::async_test]
    async fn test_favorites_are_per_user() {
        let test_db = create_standard_test_db().await;
        let course = FavoriteTarget::course(test_db.course_id("MSc Informatics"));

        add_favorite(&test_db.pool, test_db.user_id("user_alice"), course)
            .await
            .expect("Alice add failed");
        add_favorite(&test_db.pool, test_db.user_id("user_bob"), course)
            .await
            .expect("Bob should be able to favorite the same course");

        let bob = list_favorites(&test_db.pool, test_db.user_id("user_bob"), None)
            .await
            .expect("Failed to list");
        assert_eq!(bob.len(), 1);
    }

    #[rocket::async_test]
    async fn test_upsert_creates_then_updates_in_place() {
        let test_db = create_standard_test_db().await;
        let user_id = alice(&test_db);
        let course_id = test_db.course_id("Master of Data Science");

        let created = upsert_tracked_item(
            &test_db.pool,
            user_id,
            course_id,
            ApplicationStatus::NotStarted,
            Some("Check entry requirements"),
            None,
        )
        .await
        .expect("Failed to create tracked item");

        assert_eq!(created.status, ApplicationStatus::NotStarted);
        assert_eq!(created.course_name, "Master of Data Science");
        assert!(created.course_link.starts_with("https://courses.example/"));
        assert!(!created.archived);

        let updated = upsert_tracked_item(
            &test_db.pool,
            user_id,
            course_id,
            ApplicationStatus::Applied,
            None,
            Some(true),
        )
        .await
        .expect("Failed to update tracked item");

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.status, ApplicationStatus::Applied);
        assert_eq!(updated.notes, "Check entry requirements");
        assert!(updated.archived);

        // any status may follow any other
        let back = upsert_tracked_item(
            &test_db.pool,
            user_id,
            course_id,
            ApplicationStatus::Researching,
            Some(""),
            Some(false),
        )
        .await
        .expect("Failed to move status backwards");
        assert_eq!(back.status, ApplicationStatus::Researching);
        assert_eq!(back.notes, "");

        let items = list_tracked_items(&test_db.pool, user_id, TrackingFilter::default())
            .await
            .expect("Failed to list");
        assert_eq!(items.len(), 1);
    }

    #[rocket::async_test]
    async fn test_upsert_unknown_course_is_not_found() {
        let test_db = create_standard_test_db().await;
        let user_id = alice(&test_db);

        let result = upsert_tracked_item(
            &test_db.pool,
            user_id,
            4242,
            ApplicationStatus::Applied,
            None,
            None,
        )
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_status_labels_round_trip_and_reject_unknown() {
        for status in ApplicationStatus::ALL {
            assert_eq!(status.as_str().parse::<ApplicationStatus>().ok(), Some(status));
        }

        assert!(matches!(
            "Shortlisted".parse::<ApplicationStatus>(),
            Err(AppError::Validation(_))
        ));
        assert!("not started".parse::<ApplicationStatus>().is_err());
    }

    #[rocket::async_test]
    async fn test_list_tracked_items_filters_and_orders() {
        let test_db = create_standard_test_db().await;
        let user_id = alice(&test_db);
        let melbourne = test_db.course_id("Master of Data Science");
        let munich = test_db.course_id("MSc Informatics");

        upsert_tracked_item(&test_db.pool, user_id, melbourne, ApplicationStatus::Applied, None, None)
            .await
            .expect("Failed to track");
        upsert_tracked_item(
            &test_db.pool,
            user_id,
            munich,
            ApplicationStatus::Interview,
            None,
            Some(true),
        )
        .await
        .expect("Failed to track");

        let all = list_tracked_items(&test_db.pool, user_id, TrackingFilter::default())
            .await
            .expect("Failed to list");
        assert_eq!(
            all.iter().map(|i| i.course_id).collect::<Vec<_>>(),
            vec![melbourne, munich]
        );

        let active = list_tracked_items(
            &test_db.pool,
            user_id,
            TrackingFilter {
                archived: Some(false),
                status: None,
            },
        )
        .await
        .expect("Failed to list");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].course_id, melbourne);

        let interviews = list_tracked_items(
            &test_db.pool,
            user_id,
            TrackingFilter {
                archived: None,
                status: Some(ApplicationStatus::Interview),
            },
        )
        .await
        .expect("Failed to list");
        assert_eq!(interviews.len(), 1);
        assert_eq!(interviews[0].course_id, munich);

        let others = list_tracked_items(
            &test_db.pool,
            test_db.user_id("user_bob"),
            TrackingFilter::default(),
        )
        .await
        .expect("Failed to list");
        assert!(others.is_empty());
    }
}
