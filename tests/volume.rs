//! End-to-end coverage of `Volume::mount`/`read_fat`/`sync` against a
//! synthetic, in-memory FAT16 image.

use typenum::consts::U512;

use ufat::device::mem::MemDevice;
use ufat::table::ClusterValue;
use ufat::volume::Volume;
use ufat::FatType;

type Dev = MemDevice<U512>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fat16_image(block_count: usize) -> Dev {
    let mut dev = Dev::new(block_count);
    let s = dev.as_mut_slice();

    s[0x00B..0x00D].copy_from_slice(&512u16.to_le_bytes()); // bytes/sector
    s[0x00D] = 4; // sectors/cluster
    s[0x00E..0x010].copy_from_slice(&4u16.to_le_bytes()); // reserved sectors
    s[0x010] = 2; // number of FATs
    s[0x011..0x013].copy_from_slice(&512u16.to_le_bytes()); // root entries
    s[0x013..0x015].copy_from_slice(&65536u16.to_le_bytes()); // total sectors
    s[0x016..0x018].copy_from_slice(&64u16.to_le_bytes()); // sectors/FAT
    s[0x1FE..0x200].copy_from_slice(&0xAA55u16.to_le_bytes());

    dev
}

fn write_fat16_entry(dev: &mut Dev, fat_start_block: u64, cluster: u32, value: u16) {
    let offset = (fat_start_block as usize) * 512 + (cluster as usize) * 2;
    dev.as_mut_slice()[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[test]
fn mounts_and_reports_fat16_geometry() {
    init_logging();
    let dev = fat16_image(200);
    let volume: Volume<Dev> = Volume::mount(dev).unwrap();

    assert_eq!(volume.geometry().fat_type, FatType::Fat16);
    assert_eq!(volume.geometry().fat_start, 4);
    assert_eq!(volume.geometry().root_size, 32);
    assert_eq!(volume.geometry().cluster_start, 164);
}

#[test]
fn walks_a_three_cluster_chain_to_eoc() {
    init_logging();
    let mut dev = fat16_image(200);

    // Chain: 2 -> 5 -> 9 -> EOC.
    write_fat16_entry(&mut dev, 4, 2, 5);
    write_fat16_entry(&mut dev, 4, 5, 9);
    write_fat16_entry(&mut dev, 4, 9, 0xFFFF);

    let mut volume: Volume<Dev> = Volume::mount(dev).unwrap();

    let mut chain = vec![2u32];
    loop {
        let cluster = *chain.last().unwrap();
        match volume.read_fat(cluster).unwrap() {
            ClusterValue::Next(next) => chain.push(next),
            ClusterValue::Eoc => break,
            ClusterValue::Bad => panic!("unexpected BAD cluster in chain"),
        }
    }

    assert_eq!(chain, vec![2, 5, 9]);
}

#[test]
fn bad_cluster_marker_is_reported() {
    let mut dev = fat16_image(200);
    write_fat16_entry(&mut dev, 4, 3, 0xFFF7);

    let mut volume: Volume<Dev> = Volume::mount(dev).unwrap();
    assert_eq!(volume.read_fat(3).unwrap(), ClusterValue::Bad);
}

#[test]
fn sync_on_a_clean_volume_is_a_no_op() {
    let dev = fat16_image(200);
    let mut volume: Volume<Dev> = Volume::mount(dev).unwrap();

    volume.read_fat(2).unwrap();
    volume.sync().unwrap();

    assert_eq!(volume.stats().write, 0);
    assert_eq!(volume.stats().write_blocks, 0);
}

#[test]
fn cache_hit_plus_miss_tracks_read_fat_calls() {
    let mut dev = fat16_image(200);

    // Both clusters land in the same FAT block, so the second lookup is
    // a cache hit.
    write_fat16_entry(&mut dev, 4, 2, 9);
    write_fat16_entry(&mut dev, 4, 3, 9);

    let mut volume: Volume<Dev> = Volume::mount(dev).unwrap();
    volume.read_fat(2).unwrap();
    volume.read_fat(3).unwrap();

    // One extra miss comes from mount's own read of the boot sector.
    assert_eq!(volume.stats().cache_hit + volume.stats().cache_miss, 3);
    assert_eq!(volume.stats().cache_hit, 1);
    assert_eq!(volume.stats().cache_miss, 2);
}

#[test]
fn invalid_cluster_index_is_rejected() {
    let dev = fat16_image(200);
    let mut volume: Volume<Dev> = Volume::mount(dev).unwrap();

    let geometry = *volume.geometry();
    let err = volume.read_fat(geometry.num_clusters).unwrap_err();
    assert_eq!(err.code(), ufat::ErrorCode::InvalidCluster);
}
