/// 경매 컬럼 목록
macro_rules! auction_columns {
    () => {
        "id, description, category, starting_price, current_price, minimum_increment, start_time, end_time, duration_days, owner, state, version, created_at"
    };
}

/// 경매 생성
pub const INSERT_AUCTION: &str = concat!(
    "INSERT INTO auctions (description, category, starting_price, current_price, minimum_increment, start_time, end_time, duration_days, owner, state, version, created_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 1, $11)
     RETURNING ",
    auction_columns!()
);

/// 경매 조회
pub const GET_AUCTION: &str = concat!("SELECT ", auction_columns!(), " FROM auctions WHERE id = $1");

/// 모든 경매 조회
pub const GET_ALL_AUCTIONS: &str = concat!("SELECT ", auction_columns!(), " FROM auctions ORDER BY id");

/// 버전 검사 후 경매 갱신
pub const REPLACE_AUCTION: &str = concat!(
    "UPDATE auctions
     SET description = $3, category = $4, current_price = $5, minimum_increment = $6,
         start_time = $7, end_time = $8, duration_days = $9, state = $10, version = version + 1
     WHERE id = $1 AND version = $2
     RETURNING ",
    auction_columns!()
);

/// 입찰 확정용 가격 반영 (version 이 같고 더 높은 가격일 때만)
pub const ADVANCE_PRICE: &str = r#"
    UPDATE auctions
    SET current_price = $3, version = version + 1
    WHERE id = $1 AND version = $2 AND current_price < $3
"#;

/// 경매 삭제
pub const DELETE_AUCTION: &str = "DELETE FROM auctions WHERE id = $1";

/// 종료 시간이 지난 진행 중 경매
pub const GET_EXPIRED_AUCTIONS: &str = concat!(
    "SELECT ",
    auction_columns!(),
    " FROM auctions WHERE state = 'ACTIVE' AND end_time IS NOT NULL AND end_time <= $1 ORDER BY id"
);

/// 입찰 저장
pub const INSERT_BID: &str = r#"
    INSERT INTO bids (auction_id, bidder_id, bidder_name, amount, created_at)
    VALUES ($1, $2, $3, $4, $5)
    RETURNING id, auction_id, bidder_id, bidder_name, amount, created_at
"#;

/// 입찰 조회
pub const GET_BID: &str =
    "SELECT id, auction_id, bidder_id, bidder_name, amount, created_at FROM bids WHERE id = $1";

/// 경매별 입찰 이력 (입력 순)
pub const GET_AUCTION_BIDS: &str = r#"
    SELECT id, auction_id, bidder_id, bidder_name, amount, created_at
    FROM bids
    WHERE auction_id = $1
    ORDER BY id ASC
"#;

/// 입찰자별 입찰 이력 (입력 순)
pub const GET_BIDDER_BIDS: &str = r#"
    SELECT id, auction_id, bidder_id, bidder_name, amount, created_at
    FROM bids
    WHERE bidder_id = $1
    ORDER BY id ASC
"#;

/// 입찰 삭제
pub const DELETE_BID: &str = "DELETE FROM bids WHERE id = $1";
