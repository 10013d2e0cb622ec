pub mod test_utils {
    use crate::auth::ExternalIdentity;
    use crate::config::AppConfig;
    use crate::db::resolve_user;
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::ledger::ActionRewards;
    use rocket::local::asynchronous::Client;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init_test_tracing() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
                )
                .with_test_writer()
                .try_init();
        });
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        universities: Vec<TestUniversity>,
        courses: Vec<TestCourse>,
        communities: Vec<(String, String)>,
        posts: Vec<TestPost>,
    }

    pub struct TestUser {
        pub handle: String,
        pub email: Option<String>,
        pub xp: i64,
    }

    pub struct TestUniversity {
        pub name: String,
        pub city: String,
        pub country: String,
    }

    pub struct TestCourse {
        pub name: String,
        pub university: String,
        pub link: String,
    }

    pub struct TestPost {
        pub author: String,
        pub country: Option<String>,
        pub content: String,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn user(mut self, handle: &str, email: Option<&str>) -> Self {
            self.users.push(TestUser {
                handle: handle.to_string(),
                email: email.map(String::from),
                xp: 0,
            });
            self
        }

        pub fn user_with_xp(mut self, handle: &str, xp: i64) -> Self {
            self.users.push(TestUser {
                handle: handle.to_string(),
                email: None,
                xp,
            });
            self
        }

        pub fn university(mut self, name: &str, city: &str, country: &str) -> Self {
            self.universities.push(TestUniversity {
                name: name.to_string(),
                city: city.to_string(),
                country: country.to_string(),
            });
            self
        }

        pub fn course(mut self, name: &str, university: &str) -> Self {
            self.courses.push(TestCourse {
                name: name.to_string(),
                university: university.to_string(),
                link: format!("https://courses.example/{}", name.to_lowercase().replace(' ', "-")),
            });
            self
        }

        pub fn community(mut self, name: &str, community_type: &str) -> Self {
            self.communities
                .push((name.to_string(), community_type.to_string()));
            self
        }

        pub fn post(mut self, author: &str, country: Option<&str>, content: &str) -> Self {
            self.posts.push(TestPost {
                author: author.to_string(),
                country: country.map(String::from),
                content: content.to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            init_test_tracing();

            // one connection, kept alive, so every query sees the same in-memory database
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut user_ids = HashMap::new();
            let mut university_ids = HashMap::new();
            let mut course_ids = HashMap::new();

            for user in &self.users {
                let mut identity = ExternalIdentity::new(&user.handle);
                if let Some(email) = &user.email {
                    identity = identity.with_email(email);
                }

                let id = resolve_user(&pool, &identity).await?.user().id;

                if user.xp > 0 {
                    sqlx::query("UPDATE users SET xp = ? WHERE id = ?")
                        .bind(user.xp)
                        .bind(id)
                        .execute(&pool)
                        .await?;
                }

                user_ids.insert(user.handle.clone(), id);
            }

            for university in &self.universities {
                let res = sqlx::query("INSERT INTO universities (name, city, country) VALUES (?, ?, ?)")
                    .bind(&university.name)
                    .bind(&university.city)
                    .bind(&university.country)
                    .execute(&pool)
                    .await?;

                university_ids.insert(university.name.clone(), res.last_insert_rowid());
            }

            for course in &self.courses {
                let university_id = university_ids.get(&course.university).copied().ok_or_else(
                    || AppError::NotFound(format!("test university {}", course.university)),
                )?;

                let res =
                    sqlx::query("INSERT INTO courses (university_id, name, link) VALUES (?, ?, ?)")
                        .bind(university_id)
                        .bind(&course.name)
                        .bind(&course.link)
                        .execute(&pool)
                        .await?;

                course_ids.insert(course.name.clone(), res.last_insert_rowid());
            }

            for (name, community_type) in &self.communities {
                sqlx::query("INSERT INTO communities (name, type) VALUES (?, ?)")
                    .bind(name)
                    .bind(community_type)
                    .execute(&pool)
                    .await?;
            }

            for post in &self.posts {
                sqlx::query(
                    "INSERT INTO community_posts (author_name, content, country) VALUES (?, ?, ?)",
                )
                .bind(&post.author)
                .bind(&post.content)
                .bind(&post.country)
                .execute(&pool)
                .await?;
            }

            Ok(TestDb {
                pool,
                user_ids,
                university_ids,
                course_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_ids: HashMap<String, i64>,
        pub university_ids: HashMap<String, i64>,
        pub course_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, handle: &str) -> i64 {
            self.user_ids
                .get(handle)
                .copied()
                .expect("unknown fixture")
        }

        pub fn university_id(&self, name: &str) -> i64 {
            self.university_ids
                .get(name)
                .copied()
                .expect("unknown fixture")
        }

        pub fn course_id(&self, name: &str) -> i64 {
            self.course_ids
                .get(name)
                .copied()
                .expect("unknown fixture")
        }

        pub async fn user_count(&self) -> i64 {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await
                .expect("Failed to count users")
        }

        pub async fn xp_of(&self, handle: &str) -> i64 {
            sqlx::query_scalar::<_, i64>("SELECT xp FROM users WHERE external_id = ?")
                .bind(handle)
                .fetch_one(&self.pool)
                .await
                .expect("Failed to read xp")
        }
    }

    /// Two users, a small catalogue, communities and posts from a few
    /// countries.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .user("user_alice", Some("alice@example.com"))
            .user_with_xp("user_bob", 40)
            .university("University of Melbourne", "Melbourne", "Australia")
            .university("TU Munich", "Munich", "Germany")
            .course("Master of Data Science", "University of Melbourne")
            .course("MSc Informatics", "TU Munich")
            .community("Germany Applicants", "country")
            .community("Data Science Hub", "subject")
            .community("australia 2026 intake", "country")
            .post("Alice", Some("Germany"), "Blocked account tips?")
            .post("Bob", Some("Australia"), "Visa timeline")
            .post("Carol", Some("Germany"), "Housing in Munich")
            .post("Dan", None, "General question")
            .post("Eve", Some(""), "Untagged")
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(
            test_db.pool.clone(),
            AppConfig::default(),
            ActionRewards::standard(),
        );

        let client = Client::tracked(rocket)
            .await
            .expect("Failed to create test client");

        (client, test_db)
    }
}
